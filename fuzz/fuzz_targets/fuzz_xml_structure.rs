#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let report = facturx::cii::validate_xml_structure(s);
        assert_eq!(report.is_valid, report.errors.is_empty());
    }
});
