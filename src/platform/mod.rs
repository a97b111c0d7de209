//! OS-level virtual memory primitives: reserve, release, and guard pages.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else if #[cfg(windows)] {
        mod windows;
        pub use windows::*;
    } else {
        compile_error!("cordrt has no virtual memory backend for this target");
    }
}
