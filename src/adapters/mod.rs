//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                   |
//! |----------------|--------------------|-------------------------------|
//! | `hardware`     | SensorPort         | Board transducer (any ADC)    |
//! |                | ActuatorPort       | L298N bridge via embedded-hal |
//! | `file_log`     | LogStorage         | Append-mode file (SD card)    |
//! | `json_config`  | ConfigPort         | JSON file / postcard blob     |
//! | `time`         | DelayNs            | `std::thread::sleep`          |
//! | `sim`          | SensorPort         | Simulated reservoir           |
//! |                | ActuatorPort       |                               |
//! |                | LogStorage         | Switchable storage outage     |

pub mod file_log;
pub mod hardware;
pub mod json_config;
pub mod sim;
pub mod time;
