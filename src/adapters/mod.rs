//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements           | Connects to                 |
//! |-------------|----------------------|-----------------------------|
//! | `display`   | DisplayPort          | Character LCD row buffer    |
//! | `hardware`  | IndicatorPort        | OOB lamp GPIO               |
//! |             | ButtonPort           | PB0 / PB1 GPIO + edge ISR   |
//! |             | SoilSensorPort       | Probe power rail, ADC       |
//! | `log_sink`  | EventSink            | Serial log output           |
//! | `nvs`       | StoragePort          | NVS / in-memory store       |
//! | `sim`       | every port           | Simulated mesh stack, board |

pub mod display;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod sim;
