//! Fuzz target: JSON configuration loader
//!
//! Arbitrary documents must either be rejected or produce a configuration
//! that passes validation and survives the postcard blob path.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use fluidsampler::config::SystemConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = SystemConfig::from_json(text) else {
        return;
    };

    assert!(config.validate().is_ok());
    let blob = config.to_blob().expect("valid config must encode");
    let back = SystemConfig::from_blob(&blob).expect("encoded config must decode");
    assert_eq!(back, config);
});
