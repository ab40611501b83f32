pub mod achievement;
pub mod completion;
pub mod progress;
pub mod settings;
pub mod task_definition;
pub mod weekly_history;
pub mod weekly_stat;
