// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rustc_version = match rustc_version::version() {
        Ok(v) => v.to_string(),
        Err(_) => "unknown".to_string(),
    };
    let pkg_version = std::env::var("CARGO_PKG_VERSION")?;

    let out_dir = std::env::var("OUT_DIR")?;
    let path = std::path::Path::new(&out_dir).join("build_env.rs");
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "pub(crate) const RUSTC_VERSION: &str = \"{rustc_version}\";")?;
    writeln!(file, "pub(crate) const PKG_VERSION: &str = \"{pkg_version}\";")?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
