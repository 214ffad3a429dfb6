pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logger;
pub mod model;
pub mod notify;
pub mod recorder;
pub mod store;
pub mod youtube;

pub trait Located {
    fn location(&self) -> snafu::Location;
}
