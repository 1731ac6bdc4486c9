//! Downtime window scheduling.

use ontoplan_proto::{DowntimeWindow, MigrationStep};

/// Merge contiguous downtime steps into windows.
pub fn downtime_windows(steps: &[MigrationStep]) -> Vec<DowntimeWindow> {
    let mut windows = Vec::new();
    let mut open: Option<DowntimeWindow> = None;

    for (index, step) in steps.iter().enumerate() {
        if !step.requires_downtime {
            windows.extend(open.take());
            continue;
        }
        let window = open.get_or_insert_with(|| DowntimeWindow {
            start_step: index,
            end_step: index,
            duration: 0,
            steps: Vec::new(),
        });
        window.end_step = index;
        window.duration += step.downtime_seconds();
        window.steps.push(step.description.clone());
    }
    windows.extend(open);
    windows
}
