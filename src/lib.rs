//! Tracekeeper - self-regulating resource and backpressure engine for tracers
//!
//! This library provides the two pieces a tracing runtime needs to stay out of
//! the way of the application it observes: lock-free pools that recycle trace
//! records on the hot path, and a circuit breaker that pauses tracing while
//! the host is under CPU or memory stress.

pub mod circuit_breaker;
pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod memory_stress;
pub mod object_handle;
pub mod object_pool;
pub mod pool_factory;
pub mod records;
pub mod stress_monitor;
pub mod system_cpu;
