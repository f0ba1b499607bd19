#![no_main]

use facturx::core::{InvoiceRecord, Profile, validate_invoice};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let normalized = InvoiceRecord::from_json(&value);
    for profile in Profile::ALL {
        let result = validate_invoice(&normalized.record, profile);
        assert!(result.score <= 100);
    }
    // Generation never fails on incomplete data.
    let xml = facturx::cii::to_cii_xml(&normalized.record, Profile::Extended).unwrap();
    let _ = facturx::cii::validate_xml_structure(&xml);
});
