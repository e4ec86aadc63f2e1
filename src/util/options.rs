use crate::buffer::MapKind;
use crate::util::constants::{DEFAULT_CLIENT_SLOTS, DEFAULT_LINK_SLOTS};
use crate::util::log::{trace, warn};
use std::default::Default;
use std::path::PathBuf;

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Options for creating buffers. Every option can be overridden by an environment
        /// variable `METABUF_<OPTION NAME IN UPPER CASE>`.
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Set an option by its name. Returns false and keeps the old value if the value
            /// cannot be parsed or is invalid, or if the name is unknown.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                trace!("Trying to process option pair: ({}, {})", s, val);
                match s {
                    // Parse the given value from str (by env vars or by calling set_from_str()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // If we have env vars that start with METABUF_ and match any option (such as METABUF_MAP_KIND),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "METABUF_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    // Storage backend of new buffers: `Linear` (dense array over the catalog) or `Hash`.
    map_kind:             MapKind  [always_valid] = MapKind::Linear,
    // Merge link slots each buffer preallocates. The table grows past this on demand.
    initial_link_slots:   usize    [|v: &usize| *v > 0] = DEFAULT_LINK_SLOTS,
    // Client slots each buffer preallocates. The table grows past this on demand.
    initial_client_slots: usize    [|v: &usize| *v > 0] = DEFAULT_CLIENT_SLOTS,
    // Directory receiving binary and text dumps (under a `metadata` subdirectory).
    dump_directory:       PathBuf  [|v: &PathBuf| !v.as_os_str().is_empty()] = std::env::temp_dir(),
}
