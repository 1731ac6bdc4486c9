//! Rollback plan derivation.

use ontoplan_proto::MigrationStep;

/// Reverse the steps that carry a rollback payload.
///
/// Each rollback step keeps the forward type and entity, runs the payload,
/// takes `ceil(duration * factor)` seconds and records the forward index in
/// `metadata.rollback_of`.
pub fn derive_rollback(steps: &[MigrationStep], factor: f64) -> Vec<MigrationStep> {
    steps
        .iter()
        .enumerate()
        .rev()
        .filter_map(|(index, step)| {
            let script = step.rollback_script.clone()?;
            let mut rollback = MigrationStep::new(
                step.step_type,
                step.entity.clone(),
                format!("Roll back: {}", step.description),
                script,
                scale(step.estimated_duration_seconds, factor),
            )
            .with_metadata("rollback_of", index);
            if step.requires_downtime {
                let downtime = scale(step.downtime_seconds(), factor);
                rollback = rollback.with_downtime(downtime);
            }
            Some(rollback)
        })
        .collect()
}

fn scale(seconds: u64, factor: f64) -> u64 {
    (seconds as f64 * factor).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontoplan_proto::{StepScript, StepType};

    fn step(step_type: StepType, duration: u64, rollback: bool) -> MigrationStep {
        let script = StepScript::DropCollection { name: "t".into() };
        let step = MigrationStep::new(step_type, "Order", step_type.to_string(), script.clone(), duration);
        if rollback {
            step.with_rollback(script)
        } else {
            step
        }
    }

    #[test]
    fn test_reverse_of_reversible_steps() {
        let steps = vec![
            step(StepType::CreateTempCollection, 5, true),
            step(StepType::CopyWithTransformation, 301, true),
            step(StepType::VerifyDataIntegrity, 60, false),
            step(StepType::AtomicSwitch, 10, true).with_downtime(10),
        ];
        let rollback = derive_rollback(&steps, 0.5);

        let types: Vec<StepType> = rollback.iter().map(|s| s.step_type).collect();
        assert_eq!(
            types,
            vec![
                StepType::AtomicSwitch,
                StepType::CopyWithTransformation,
                StepType::CreateTempCollection,
            ]
        );
        assert_eq!(rollback[0].metadata["rollback_of"], serde_json::json!(3));
        assert_eq!(rollback[0].downtime_duration_seconds, Some(5));
        assert_eq!(rollback[1].estimated_duration_seconds, 151);
        assert_eq!(rollback[2].estimated_duration_seconds, 3);
        assert!(rollback.iter().all(|s| s.rollback_script.is_none()));
    }

    #[test]
    fn test_no_payload_no_rollback() {
        let steps = vec![step(StepType::VerifyConversion, 60, false)];
        assert!(derive_rollback(&steps, 0.5).is_empty());
    }
}
