#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let normalized = facturador::core::normalize_nif(s);
        let valid = facturador::core::is_valid_nif(s);
        // Validation only depends on the normalized form.
        assert_eq!(valid, facturador::core::is_valid_nif(&normalized));
    }
});
