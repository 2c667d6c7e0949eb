//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements         | Connects to                    |
//! |---------------|--------------------|--------------------------------|
//! | `gpio`        | SensorPort         | embedded-hal input pins, ADC   |
//! |               | ActuatorPort       | embedded-hal output pins       |
//! | `sim`         | SensorPort         | Simulated membrane + container |
//! |               | ActuatorPort       |                                |
//! | `log_sink`    | EventSink          | `log` facade                   |
//! | `json_config` | ConfigPort         | `config.json` on disk          |
//! | `file_store`  | StoragePort        | One file per key on disk       |
//! | `memory`      | StoragePort        | In-memory map (tests, dry run) |
//! | `time`        | ClockPort          | `Instant`/`SystemTime`, manual |

pub mod file_store;
pub mod gpio;
pub mod json_config;
pub mod log_sink;
pub mod memory;
pub mod sim;
pub mod time;
