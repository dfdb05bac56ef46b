pub mod api_model;
pub mod demand;
pub mod gps;
pub mod gtfs_model;
pub mod route;
pub mod route_suggestion;
pub mod stop;
pub mod trip;
