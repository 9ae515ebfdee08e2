use crate::models::WorkItem;

/// What travels on the task queue
#[derive(Debug, Clone)]
pub enum Task {
    Work(Box<WorkItem>),
    /// Poison pill: the receiving worker exits
    Shutdown,
}
