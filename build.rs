//! Retrieves information about the version of the harness from Git and the
//! build environment. It is embedded into the binaries so that a report can be
//! traced back to the exact build that produced it.

fn main() -> shadow_rs::SdResult<()> {
    shadow_rs::new()
}
