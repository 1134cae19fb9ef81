//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements            | Connects to              |
//! |-------------|-----------------------|--------------------------|
//! | `hardware`  | SensorPort            | ESP32 ADC, tach ISR      |
//! |             | ActuatorPort          | ESP32 PWM, GPIO          |
//! | `log_sink`  | EventSink             | Serial log output        |
//! | `nvs`       | StatePort, ConfigPort | NVS / in-memory store    |
//! |             | StoragePort           |                          |
//! | `mqtt`      | SyncPort, EventSink   | MQTT broker / sim broker |
//! | `wifi`      | ConnectivityPort      | ESP-IDF WiFi STA         |
//! | `time`      | —                     | ESP32 system timer       |
//! | `device_id` | —                     | eFuse factory MAC        |

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
