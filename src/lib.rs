// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Decoding of compiled and source terminfo entries into one capability model

pub mod binary;
pub mod catalog;
pub mod registry;
pub mod resolve;
pub mod source;
pub mod terminfo;

pub use catalog::{Catalog, Kind, StandardCatalog};
pub use registry::Registry;
pub use resolve::resolve_uses;
pub use terminfo::{Extended, TermInfo, Value};
