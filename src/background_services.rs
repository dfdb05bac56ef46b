pub mod feature_builder;
pub mod gps_writer;
pub mod training;
