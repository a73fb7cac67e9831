pub mod cli;
pub mod config;
pub mod feature;
pub mod kmeans;
pub mod knn;
pub mod model;
pub mod utils;
pub mod vlad;
pub mod vocab;

pub use config::Opts;
pub use model::VladModel;
pub use vocab::Vocabulary;
