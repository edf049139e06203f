#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = facturador::channels::parse_face_status(s);
        let _ = facturador::channels::parse_faceb2b_status(s);
        let _ = facturador::verifactu::parse_aeat_lines(s);
        let _ = facturador::verifactu::parse_aeat_response(s);
    }
});
