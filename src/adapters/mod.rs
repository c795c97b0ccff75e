//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                    |
//! |-------------|---------------------|--------------------------------|
//! | `hardware`  | SerialPort          | Radio UART driver              |
//! |             | SensorPort          | ADC closure, `InputPin`s       |
//! |             | IndicatorPort       | `OutputPin`s                   |
//! |             | ClockPort           | Tick counter closure           |
//! | `log_sink`  | EventSink           | `log` facade                   |
//! | `sim`       | every port          | In-memory wire + scripted DOG  |

pub mod hardware;
pub mod log_sink;
pub mod sim;
