pub mod forecaster;
pub mod model;
pub mod scaler;

pub use forecaster::{ForecastConfig, Forecaster};
pub use model::RecurrentNet;
pub use scaler::MinMaxScaler;
