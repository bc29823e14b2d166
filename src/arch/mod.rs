// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture-specific modules
//!
//! Each architecture implements [`Arch`](crate::traits::Arch) in its own
//! subdirectory. Only bare-metal x86_64 is supported; host builds use the
//! mock in `testing` and only compile the amd64 frame layout.

#[cfg(all(target_arch = "x86_64", any(target_os = "none", test)))]
pub mod amd64;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use amd64::Amd64;
