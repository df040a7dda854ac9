pub mod aggregate;
pub mod locate;
pub mod path_level;
pub mod reference;
pub mod timeseries;
