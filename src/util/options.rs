use crate::util::constants::*;
use crate::util::conversions::raw_is_aligned;
use std::default::Default;
use std::path::PathBuf;

fn always_valid<T>(_: &T) -> bool {
    true
}

fn valid_segment_size(size: &usize) -> bool {
    *size >= 4 * MIN_OBJECT_SIZE && raw_is_aligned(*size, BYTES_IN_GRAIN)
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Set an option from its snake_case name. Returns false, keeping the current
            /// value, if the name is unknown or the value does not parse or validate.
            // `PathBuf` options parse infallibly.
            #[allow(irrefutable_let_patterns)]
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling process()) to the right type
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

            /// Options with their default values, ignoring the environment.
            pub fn builtin_defaults() -> Self {
                Options {
                    $($name: $default),*
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Self::builtin_defaults();

                // If we have env vars that start with OBJMEM_ and match any option (such as OBJMEM_ORPHAN_CHECK),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "OBJMEM_";
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
    // Validate every reference during marking. Slow; a bad reference aborts the process with diagnostics.
    orphan_check:           bool    [always_valid] = false,
    // Write a raw memory dump when a fatal consistency error is found.
    dump_enable:            bool    [always_valid] = false,
    // Where the raw memory dump goes.
    dump_path:              PathBuf [always_valid] = PathBuf::from("objmem.dump"),
    // The image file restored at initialization.
    image_path:             PathBuf [always_valid] = PathBuf::from("objmem.img"),
    // Restore the image at image_path when the memory is initialized.
    restore_image:          bool    [always_valid] = false,
    // Ceiling on memory committed to segments.
    max_heap_size:          usize   [|v: &usize| *v > 0] = DEFAULT_MAX_HEAP_SIZE,
    // Size of a normal segment.
    segment_size:           usize   [valid_segment_size] = DEFAULT_SEGMENT_SIZE,
    // Minimum size of a large segment.
    large_segment_size:     usize   [valid_segment_size] = DEFAULT_LARGE_SEGMENT_SIZE,
    // Objects of this size or larger are allocated in large segments.
    large_object_threshold: usize   [|v: &usize| *v >= MIN_OBJECT_SIZE] = DEFAULT_LARGE_OBJECT_THRESHOLD,
    // Bytes allocated since the last collection before an allocation failure collects first.
    collection_threshold:   usize   [always_valid] = DEFAULT_COLLECTION_THRESHOLD,
    // Initial number of live stack entries.
    live_stack_size:        usize   [|v: &usize| *v > 1] = DEFAULT_LIVE_STACK_SIZE,
    // Initial number of save stack entries.
    save_stack_size:        usize   [|v: &usize| *v > 0] = DEFAULT_SAVE_STACK_SIZE,
}

impl Options {
    /// Set an option from a name that may be in camelCase (`maxHeapSize`) or snake_case.
    pub fn set_from_camelcase_str(&mut self, s: &str, val: &str) -> bool {
        trace!("Trying to process option pair: ({}, {})", s, val);

        let mut sr = String::with_capacity(s.len());
        for c in s.chars() {
            if c.is_uppercase() {
                sr.push('_');
                for c in c.to_lowercase() {
                    sr.push(c);
                }
            } else {
                sr.push(c)
            }
        }

        let result = self.set_from_str(sr.as_str(), val);

        trace!("Trying to process option pair: ({})", sr);

        if result {
            trace!("Validation passed");
        } else {
            trace!("Validation failed")
        }
        result
    }

    /// Set options from a string of `key=value` pairs separated by white space, such as
    /// `"maxHeapSize=1048576 orphan_check=true"`. Every pair is tried; returns true only if
    /// all of them were accepted.
    pub fn set_bulk_from_str(&mut self, options: &str) -> bool {
        let mut all_ok = true;
        for opt in options.split_ascii_whitespace() {
            match opt.split_once('=') {
                Some((key, value)) => all_ok &= self.set_from_camelcase_str(key, value),
                None => {
                    warn!("Option {:?} is not of the form key=value", opt);
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}
