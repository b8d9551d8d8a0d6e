pub mod flapping_tests;
pub mod notification_tests;
pub mod retention_tests;
pub mod state_machine_tests;
