//! Application layer for the Daydream binding.
//!
//! - **`opi`** – The OPI machine trait, its request/response types, and the
//!   error type every OPI call returns.
//! - **`present_series`** – Presents a scripted list of stimuli through any
//!   OPI machine and collects one record per presentation.
//!
//! **Dependency rule**: this layer depends on `opi_core` only; sockets live
//! in `infrastructure`.

pub mod opi;
pub mod present_series;
