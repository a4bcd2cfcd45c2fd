pub mod analyzers;
pub mod aqi;
pub mod breakpoints;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod impute;
pub mod output;
pub mod parser;
pub mod pollutant;
pub mod stats;
