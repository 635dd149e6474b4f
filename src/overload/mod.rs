pub mod fixed_window;
pub mod flow_controller;
pub mod overload_filter;
pub mod registry;
pub mod seconds_limiter;
pub mod smooth_limiter;
