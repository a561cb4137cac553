use crate::models::{Priority, Status, Task};

/// Bonus that puts every overdue task ahead of any on-time task.
pub const DELAY_SCORE: u32 = 1000;

/// Calculates the scheduling score for a task. Higher scores are placed
/// first.
///
/// The score is the sum of:
/// - **Delay**: 1000 when the task has missed its deadline.
/// - **Priority**: Urgent 500, High 300, Medium 100, Low 0.
pub fn compute_score(task: &Task) -> u32 {
    let delay = if task.status == Status::Delay {
        DELAY_SCORE
    } else {
        0
    };
    delay + priority_score(task.priority)
}

pub fn priority_score(priority: Priority) -> u32 {
    match priority {
        Priority::Urgent => 500,
        Priority::High => 300,
        Priority::Medium => 100,
        Priority::Low => 0,
    }
}

/// Orders the queue by descending score. The sort is stable, so tasks with
/// equal scores keep their stored order.
pub fn sort_by_score(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| std::cmp::Reverse(compute_score(t)));
}
