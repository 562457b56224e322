//! State keys written and read by the case workflow.

/// Base64 of the uploaded file.
pub const DOCUMENT_BYTES: &str = "document_bytes";
pub const DOCUMENT_FILENAME: &str = "document_filename";
pub const DOCUMENT_TEXT: &str = "document_text";
pub const DOCUMENT_TEXT_EN: &str = "document_text_en";
pub const CASE_FACTS: &str = "case_facts";

pub const NDPS_SECTIONS: &str = "ndps_sections_mapped";
pub const BNS_SECTIONS: &str = "bns_sections_mapped";
pub const BNSS_SECTIONS: &str = "bnss_sections_mapped";
pub const BSA_SECTIONS: &str = "bsa_sections_mapped";
pub const FORENSIC_GUIDELINES: &str = "forensic_guidelines_mapped";

pub const NEXT_STEPS: &str = "next_steps";
pub const EVIDENCE_CHECKLIST: &str = "evidence_checklist";
pub const DOS: &str = "dos";
pub const DONTS: &str = "donts";
pub const PROSECUTION_WEAKNESSES: &str = "prosecution_weaknesses";
pub const HISTORICAL_CASES: &str = "historical_cases";

/// Every mapped-record key, statute acts first.
pub const MAPPED: [&str; 5] = [
    NDPS_SECTIONS,
    BNS_SECTIONS,
    BNSS_SECTIONS,
    BSA_SECTIONS,
    FORENSIC_GUIDELINES,
];
