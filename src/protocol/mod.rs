//! Telemetry Wire Protocol
//!
//! Frames exchanged with the telemetry server over the persistent socket.
//! Every frame is a UTF-8 JSON text message; the same schema is used in
//! both directions.
//!
//! ## Example
//!
//! ```rust
//! use iotstudio_live::protocol::{Frame, FrameType};
//!
//! let frame = Frame::decode(r#"{"type":"data","sessionId":"s1","deviceId":"d1","timestamp":1,"data":{"temp":20.1}}"#).unwrap();
//! assert_eq!(frame.kind, FrameType::Data);
//!
//! let outbound = Frame::subscribe("s1").encode().unwrap();
//! assert!(outbound.contains("\"subscribe\""));
//! ```

mod frame;

pub use frame::{Frame, FrameError, FrameType};
