//! Data-acquisition clients: census demographics and weather history.

pub mod census;
pub mod http;
pub mod weather;

pub use census::CensusClient;
pub use http::{BasicClient, HttpClient};
pub use weather::{WeatherClient, WeatherCollector};
