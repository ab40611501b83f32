pub mod achievement_service;
pub mod completion_service;
pub mod goal_calculator;
pub mod multiplier;
pub mod progress_service;
pub mod prompt_templates;
pub mod settings_service;
pub mod task_catalog_service;
pub mod text_generation;
pub mod weekly_aggregator;
