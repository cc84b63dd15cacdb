//! Configuration and launch request schema for Marquee.
//!
//! This crate defines the data layer shared by every other Marquee crate:
//! the TOML orchestrator configuration (`MarqueeConfig`), the immutable
//! `LaunchRequest` handed in by callers, and the small value types it is made
//! of (execution variant, Wine architecture, debug channels, resolution).

pub mod config;
pub mod request;

pub use config::{
    default_config_path, parse_config_file, parse_config_str, AudioSection, ConfigError,
    DebugSection, EngineKind, EngineSection, MarqueeConfig, PathsSection, SessionSection,
};
pub use request::{
    parse_request_file, parse_request_str, DebugChannels, ExecutionVariant, GameDescriptor,
    LaunchRequest, PlatformDescriptor, RequestError, Resolution, WineArch,
};
