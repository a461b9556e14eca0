use kiln_lib::platform::paths::{cache_dir, state_dir};
use kiln_lib::platform::{host_target, platform_triple};

use crate::output::print_stat;

pub fn cmd_info() {
  println!("kiln {}", env!("CARGO_PKG_VERSION"));
  println!();
  match platform_triple() {
    Some(triple) => print_stat("Platform", &triple),
    None => print_stat("Platform", "unknown"),
  }
  print_stat("Host target", host_target().as_deref().unwrap_or("unknown"));
  print_stat("State dir", &state_dir().display().to_string());
  print_stat("Cache dir", &cache_dir().display().to_string());
}
