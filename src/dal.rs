pub mod csv_files;
pub mod demand_features;
pub mod demand_map;
pub mod gps_log;
pub mod gtfs;
pub mod route_suggestions;

pub use demand_features::*;
pub use demand_map::*;
pub use gps_log::*;
pub use gtfs::*;
pub use route_suggestions::*;
