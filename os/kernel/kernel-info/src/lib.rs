//! # Driver Configuration
//!
//! Compiled-in constants shared by the shared-buffer driver, the platform
//! that hosts it, and the validation harness. Nothing here is runtime
//! configurable: the buffer capacity, the device name and the initial fill
//! pattern are part of the contract a client relies on.
//!
//! ## Modules
//!
//! ### Device ([`device`])
//! * **Node name**: the single endpoint clients open
//! * **Fill pattern**: the bytes a client reads before anyone writes
//!
//! ### Memory Layout ([`memory`])
//! * **Capacity**: the size of the shared buffer
//! * **Allocation slack**: how much over-allocation page alignment needs
//! * **Hosted physical base**: where the user-space substitute places RAM
//!
//! All relationships between the constants are checked at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod device;
pub mod memory;
