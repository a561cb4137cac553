mod common;

use chrono::{Duration, Timelike};
use chrono_tz::Europe::Berlin;
use common::*;
use proptest::prelude::*;
use weekwise::localtime::{local_date, local_naive};
use weekwise::models::{DayOfWeek, Priority, Status};
use weekwise::planner::NewTask;
use weekwise::priority::compute_score;

fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
    ]
}

fn day() -> impl Strategy<Value = DayOfWeek> {
    prop_oneof![
        Just(DayOfWeek::Monday),
        Just(DayOfWeek::Tuesday),
        Just(DayOfWeek::Wednesday),
        Just(DayOfWeek::Thursday),
        Just(DayOfWeek::Friday),
        Just(DayOfWeek::Saturday),
        Just(DayOfWeek::Sunday),
    ]
}

fn overlaps(a: (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>), b: (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)) -> bool {
    a.0 < b.1 && a.1 > b.0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn placements_never_collide_or_start_at_night(
        tasks in prop::collection::vec((15u32..=240, priority(), any::<bool>()), 1..10),
        templates in prop::collection::vec((day(), 0u8..24, 0u8..2, 15u32..=180), 0..6),
        start_minutes in 0i64..(7 * 24 * 60),
    ) {
        // Late October spans the end of summer time in Berlin.
        let now = utc(2026, 10, 19, 0, 0) + Duration::minutes(start_minutes);
        let h = harness(Berlin, now);

        for (i, (d, hour, half, minutes)) in templates.iter().enumerate() {
            let at = format!("{:02}:{:02}", hour, u32::from(*half) * 30);
            h.planner.add_template(&h.user, draft(&format!("T{}", i), *d, &at, *minutes)).unwrap();
        }
        for (i, (minutes, p, overdue)) in tasks.iter().enumerate() {
            let new = NewTask {
                priority: Some(*p),
                deadline: overdue.then(|| now - Duration::hours(1)),
                ..new_task(&format!("Task {}", i), *minutes)
            };
            h.planner.add_task(&h.user, new).unwrap();
        }

        let report = h.planner.auto_schedule(&h.user).unwrap();
        let placed: Vec<_> = report.scheduled.iter().map(|p| (p.start, p.end)).collect();

        for (i, a) in placed.iter().enumerate() {
            let hour = local_naive(&Berlin, a.0).hour();
            prop_assert!((7..23).contains(&hour), "task starts at local hour {}", hour);
            prop_assert!(a.0 >= now);
            for b in &placed[i + 1..] {
                prop_assert!(!overlaps(*a, *b), "{:?} overlaps {:?}", a, b);
            }
        }

        let horizon = now + Duration::days(5);
        let weekly: Vec<_> = h
            .planner
            .schedule(&h.user, local_date(&Berlin, now), local_date(&Berlin, horizon) + Duration::days(1))
            .unwrap()
            .into_iter()
            .filter(|o| o.is_weekly() && !o.cancelled)
            .map(|o| (o.start, o.end))
            .collect();
        for a in &placed {
            for b in &weekly {
                prop_assert!(!overlaps(*a, *b), "{:?} overlaps weekly {:?}", a, b);
            }
        }
    }

    #[test]
    fn higher_scores_are_placed_no_later(
        tasks in prop::collection::vec((priority(), any::<bool>()), 2..8),
    ) {
        let now = utc(2026, 10, 19, 8, 0);
        let h = harness(chrono::Utc, now);
        for (i, (p, overdue)) in tasks.iter().enumerate() {
            let new = NewTask {
                priority: Some(*p),
                deadline: overdue.then(|| now - Duration::hours(2)),
                ..new_task(&format!("Task {}", i), 30)
            };
            h.planner.add_task(&h.user, new).unwrap();
        }
        h.planner.auto_schedule(&h.user).unwrap();

        let mut placed = h.planner.tasks(&h.user).unwrap();
        prop_assert!(placed.iter().all(|t| t.status == Status::Scheduled));
        placed.sort_by_key(|t| t.start_time);
        // With equal durations and an empty calendar, start order is score order.
        for pair in placed.windows(2) {
            let earlier = &pair[0];
            let later = &pair[1];
            let mut earlier_scored = earlier.clone();
            let mut later_scored = later.clone();
            earlier_scored.status = if earlier.deadline.is_some() { Status::Delay } else { Status::Pending };
            later_scored.status = if later.deadline.is_some() { Status::Delay } else { Status::Pending };
            prop_assert!(compute_score(&earlier_scored) >= compute_score(&later_scored));
            if compute_score(&earlier_scored) == compute_score(&later_scored) {
                prop_assert!(earlier.id < later.id);
            }
        }
    }
}
