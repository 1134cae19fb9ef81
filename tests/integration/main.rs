//! Host-side integration test suite.
//!
//! Exercises the full AppService pipeline and the MQTT sync contract
//! with mock adapters — no hardware, no broker.

mod mock_hw;

mod control_loop_tests;
mod sync_tests;
