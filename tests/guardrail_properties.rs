//! Property tests for guardrail aggregation: the verdict depends on
//! registration order only, never on which check finishes first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use switchboard::{AgentsError, GuardrailPipeline, GuardrailResult, InputGuardrail};

struct Scripted {
    name: String,
    trip: bool,
    delay: Duration,
}

#[async_trait]
impl InputGuardrail<()> for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _context: &(), _input: &str) -> switchboard::Result<GuardrailResult> {
        tokio::time::sleep(self.delay).await;
        Ok(if self.trip {
            GuardrailResult::trip(format!("{} tripped", self.name))
        } else {
            GuardrailResult::pass("ok")
        })
    }
}

fn guards(plan: &[(bool, u64)]) -> Vec<Arc<dyn InputGuardrail<()>>> {
    plan.iter()
        .enumerate()
        .map(|(i, &(trip, delay_ms))| {
            Arc::new(Scripted {
                name: format!("g{i}"),
                trip,
                delay: Duration::from_millis(delay_ms),
            }) as Arc<dyn InputGuardrail<()>>
        })
        .collect()
}

fn evaluate(plan: &[(bool, u64)]) -> Result<Vec<String>, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let guards = guards(plan);
    runtime.block_on(async {
        match GuardrailPipeline::check(&guards, &(), "input", Duration::from_secs(60)).await {
            Ok(verdicts) => Ok(verdicts.into_iter().map(|v| v.guardrail).collect()),
            Err(AgentsError::GuardrailTripwire { guardrail, .. }) => Err(guardrail),
            Err(other) => panic!("unexpected error: {other}"),
        }
    })
}

proptest! {
    #[test]
    fn first_trip_by_registration_wins(plan in prop::collection::vec((any::<bool>(), 0u64..500), 1..8)) {
        let outcome = evaluate(&plan);
        match plan.iter().position(|(trip, _)| *trip) {
            Some(first) => prop_assert_eq!(outcome, Err(format!("g{first}"))),
            None => {
                let expected: Vec<String> = (0..plan.len()).map(|i| format!("g{i}")).collect();
                prop_assert_eq!(outcome, Ok(expected));
            }
        }
    }

    #[test]
    fn verdict_ignores_completion_order(
        trips in prop::collection::vec(any::<bool>(), 1..8),
        delays in prop::collection::vec(0u64..500, 8),
    ) {
        let fast: Vec<_> = trips.iter().map(|&t| (t, 0)).collect();
        let shuffled: Vec<_> = trips.iter().zip(&delays).map(|(&t, &d)| (t, d)).collect();
        prop_assert_eq!(evaluate(&fast), evaluate(&shuffled));
    }
}
