pub mod backend;
pub mod factors;
pub mod geometry;
pub mod imu;
pub mod landmarks;
pub mod lifecycle;
pub mod system;
