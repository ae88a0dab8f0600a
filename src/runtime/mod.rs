pub mod context;
pub mod device;
pub mod live;
pub mod repair;
pub mod verify;
pub mod wrapper;
