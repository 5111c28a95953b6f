//! Terminal progress bar driven by a worker service

use super::service::{ServiceSnapshot, WorkerService};
use indicatif::{ProgressBar, ProgressStyle};

/// Resolution of the rendered bar
const BAR_LENGTH: u64 = 1000;

/// Render the aggregate progress of `service` as a terminal progress bar
///
/// The bar follows the service until it is dropped or finished by the caller.
pub fn attach_progress_bar(service: &WorkerService) -> ProgressBar {
    let pb = ProgressBar::new(BAR_LENGTH);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let bar = pb.clone();
    service.subscribe(move |snapshot| render(&bar, snapshot));
    pb
}

fn render(pb: &ProgressBar, snapshot: &ServiceSnapshot) {
    match snapshot.progress {
        Some(value) => pb.set_position((value * BAR_LENGTH as f64).round() as u64),
        None => pb.tick(),
    }

    let message = snapshot
        .running
        .iter()
        .rev()
        .find_map(|task| task.status.clone())
        .unwrap_or_default();
    pb.set_message(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, Progress, Segment};

    #[test]
    fn test_bar_follows_service() {
        let service = WorkerService::new();
        let pb = attach_progress_bar(&service);
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());

        let segment = Segment::titled("job");
        let id = service.next_id();
        service.track(id, "job", &segment, &CancelToken::new());
        segment.push(Progress::Determinate(0.5), "halfway");

        assert_eq!(pb.position(), 500);
        assert_eq!(pb.message(), "halfway");
    }
}
