pub mod params;
pub mod grasp_fsm;
pub mod gripper_hal;
pub mod gripper_hal_mock;
pub mod grasp_runner;
