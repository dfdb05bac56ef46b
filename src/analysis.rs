pub mod demand_predictor;
pub mod geo;
pub mod random_forest;
pub mod route_optimizer;
pub mod scaler;
pub mod trip_planner;
