//! C6: the learning controller. Owns the daily incremental fine-tune, the
//! weekly full retrain, and the A/B promotion decision between them — never
//! the model training itself, which lives behind the `ModelTrainer`
//! collaborator interface.

pub mod controller;
pub mod cron;
pub mod http_trainer;
pub mod stats;
pub mod trainer;
pub mod version;

pub use controller::{LearningController, LearningControllerConfig};
pub use cron::{CronParseError, CronSchedule};
pub use http_trainer::{build_client, HttpModelTrainer, TrainerConfig};
pub use trainer::{ModelTrainer, TrainRun, TrainerError, TrainerResult, TrainingWindow};
