#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parse → serialize → parse must not panic at any step.
        if let Ok(invoice) = facturador::facturae::from_facturae_xml(s) {
            if let Ok(xml2) = facturador::facturae::to_facturae_xml(&invoice) {
                let _ = facturador::facturae::from_facturae_xml(&xml2);
            }
        }
    }
});
