use crate::access_log::{AccessAction, AccessLogOutcome, AccessRequest};
use crate::config::ProtectionConfig;
use crate::detection::{PiiCategory, Sensitivity};
use crate::engine::{ProtectionEngine, ProtectionStatus};
use crate::policy::Role;
use anyhow::Result;
use tempfile::TempDir;
use tracing::info;

const CASE_TEXT: &str = "John Smith, DOB 01/15/1980, lives at 123 Main Street.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

fn create_test_config() -> (ProtectionConfig, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ProtectionConfig::default();
    config.access_log.path = temp_dir.path().join("audit").join("pii_access.log");
    (config, temp_dir)
}

fn create_test_engine() -> Result<(ProtectionEngine, TempDir)> {
    let (config, temp_dir) = create_test_config();
    Ok((ProtectionEngine::new(config)?, temp_dir))
}

fn access_request(content: &str) -> AccessRequest {
    AccessRequest {
        user_id: "test_user".to_string(),
        session_id: "test_session".to_string(),
        data_type: "patient_narrative".to_string(),
        data_content: content.to_string(),
        action: AccessAction::Read,
        success: true,
        context: "case_review".to_string(),
    }
}

#[test]
fn test_name_in_plain_sentence() -> Result<()> {
    init_tracing();
    let (engine, _t) = create_test_engine()?;

    let report = engine.detect_pii("John Smith reported feeling dizzy.", "");

    assert_eq!(report.status, ProtectionStatus::Active);
    assert_eq!(report.detections.len(), 1);
    let name = &report.detections[0];
    assert_eq!(name.category, PiiCategory::Name);
    assert_eq!(name.original_text, "John Smith");
    assert_eq!(name.sensitivity, Sensitivity::High);
    assert!(name.confidence >= 0.8);
    Ok(())
}

#[test]
fn test_phone_with_area_code() -> Result<()> {
    let (engine, _t) = create_test_engine()?;

    let report = engine.detect_pii("Contact patient at (555) 123-4567.", "");

    assert_eq!(report.detections.len(), 1);
    let phone = &report.detections[0];
    assert_eq!(phone.category, PiiCategory::Phone);
    assert_eq!(phone.original_text, "(555) 123-4567");
    assert!((phone.confidence - 0.9).abs() < 1e-9);
    assert_eq!(phone.replacement, "[PHONE]");
    Ok(())
}

#[test]
fn test_full_masking_for_auditor() -> Result<()> {
    init_tracing();
    let (engine, _t) = create_test_engine()?;

    let outcome = engine.mask_pii(CASE_TEXT, &Role::new("auditor"), "case_review", Some(false));
    info!("Masked text: {}", outcome.text);

    for fragment in ["John Smith", "01/15/1980", "123 Main Street"] {
        assert!(!outcome.text.contains(fragment), "{} leaked", fragment);
    }
    assert_eq!(
        outcome.text,
        "[PATIENT_45], DOB [DATE_OF_BIRTH], lives at [ADDRESS]."
    );
    assert_eq!(outcome.masked_count, 3);
    Ok(())
}

#[test]
fn test_preserved_context_keeps_name() -> Result<()> {
    let (engine, _t) = create_test_engine()?;

    let outcome = engine.mask_pii(CASE_TEXT, &Role::new("auditor"), "case_review", Some(true));

    assert!(outcome.preserve_context);
    assert!(outcome.text.contains("John Smith"));
    assert!(!outcome.text.contains("01/15/1980"));
    assert!(!outcome.text.contains("123 Main Street"));
    Ok(())
}

#[test]
fn test_anonymize_case_text() -> Result<()> {
    let (engine, _t) = create_test_engine()?;

    let (anonymized, record) = engine.anonymize(CASE_TEXT, "research_data");

    assert_eq!(record.metadata.status, ProtectionStatus::Active);
    assert_eq!(record.metadata.pii_instances_found, 3);
    for fragment in ["John Smith", "01/15/1980", "123 Main Street"] {
        assert!(!anonymized.contains(fragment));
    }
    assert!(anonymized.starts_with("[PATIENT_NAME]"));
    assert!(record.metadata.anonymization_map_hash.is_some());
    Ok(())
}

#[test]
fn test_no_log_write_without_consent_tracking() -> Result<()> {
    let (mut config, _t) = create_test_config();
    config.security.consent_tracking = false;
    let engine = ProtectionEngine::new(config)?;

    let outcome = engine.log_access(&access_request("John Smith reported symptoms"));

    assert_eq!(outcome, AccessLogOutcome::Skipped);
    assert!(!engine.config().access_log.path.exists());
    Ok(())
}

#[test]
fn test_access_log_never_contains_raw_pii() -> Result<()> {
    let (engine, _t) = create_test_engine()?;

    let outcome = engine.log_access(&access_request("John Smith reported symptoms, call 555-123-4567"));
    assert!(matches!(outcome, AccessLogOutcome::Written { .. }));

    let content = std::fs::read_to_string(&engine.config().access_log.path)?;
    assert!(content.contains("test_user"));
    assert!(content.contains("patient_narrative"));
    assert!(!content.contains("John Smith"));
    assert!(!content.contains("555-123-4567"));
    assert!(content.contains("[PHONE]"));
    Ok(())
}

#[test]
fn test_resolved_spans_are_disjoint_and_ordered() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "Dr. Mary Jones (MRN: AB1234567) at 42 Oak Avenue, 90210, phone +1 555 123 4567, \
                mary.jones@clinic.org, seen 2024-03-20 and born March 3, 1975.";

    let detections = engine.detect_pii(text, "case_review").detections;

    assert!(!detections.is_empty());
    for pair in detections.windows(2) {
        assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    for detection in &detections {
        assert_eq!(&text[detection.start..detection.end], detection.original_text);
    }
    Ok(())
}

#[test]
fn test_masking_is_deterministic_and_idempotent() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let role = Role::new("auditor");

    let first = engine.mask_pii(CASE_TEXT, &role, "", Some(false));
    let second = engine.mask_pii(CASE_TEXT, &role, "", Some(false));
    assert_eq!(first.text, second.text);
    assert_eq!(
        first.detections.iter().map(|d| (d.start, d.end)).collect::<Vec<_>>(),
        second.detections.iter().map(|d| (d.start, d.end)).collect::<Vec<_>>()
    );

    let again = engine.mask_pii(&first.text, &role, "", Some(false));
    assert_eq!(again.text, first.text);
    Ok(())
}

#[test]
fn test_broader_role_masks_at_least_as_much() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "John Smith from 123 Main St called (555) 123-4567 on 03/20/2024, email john@ex.com.";

    let reviewer = engine.mask_pii(text, &Role::new("reviewer"), "", Some(false));
    let readonly = engine.mask_pii(text, &Role::new("readonly"), "", Some(false));
    let auditor = engine.mask_pii(text, &Role::new("auditor"), "", Some(false));

    assert!(readonly.masked_count >= reviewer.masked_count);
    assert!(auditor.masked_count >= readonly.masked_count);
    assert!(reviewer.text.contains("03/20/2024"));
    assert!(!readonly.text.contains("03/20/2024"));
    Ok(())
}

#[test]
fn test_role_based_masking_scenarios() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "John Smith from 123 Main St called (555) 123-4567 about side effects.";

    let auditor = engine.mask_pii(text, &Role::new("auditor"), "case_review", Some(false));
    assert!(auditor.text.contains('['));
    assert!(!auditor.text.contains("John Smith"));

    let drafter = engine.mask_pii(text, &Role::new("drafter"), "case_creation", Some(false));
    assert!(drafter.text.contains("John Smith"));
    Ok(())
}

#[test]
fn test_patient_quote_preserved() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "Patient said: 'I felt really dizzy and my name is John Smith.'";

    let preserved = engine.mask_pii(text, &Role::new("auditor"), "patient_narrative", Some(true));
    assert!(preserved.text.contains("dizzy"));
    assert!(preserved.text.contains("John Smith"));
    assert!(preserved
        .detections
        .iter()
        .any(|d| d.category == PiiCategory::Name && d.confidence == 1.0));

    let full = engine.mask_pii(text, &Role::new("auditor"), "patient_narrative", Some(false));
    assert!(!full.text.contains("John Smith"));
    Ok(())
}

#[test]
fn test_no_name_masked_when_preserving() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "Dr. Jane Doe and Mr. Bob Lee reviewed the file; call 555-123-4567.";

    for role in ["auditor", "readonly", "reviewer"] {
        let outcome = engine.mask_pii(text, &Role::new(role), "", Some(true));
        assert!(outcome.text.contains("Jane Doe"), "role {}", role);
        assert!(outcome.text.contains("Bob Lee"), "role {}", role);
        assert!(outcome.text.contains("[PHONE]"), "role {}", role);
    }
    Ok(())
}

#[test]
fn test_preserving_never_masks_outside_role_profile() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "Reach john@ex.com, MRN: AB1234567.";
    let reviewer = Role::new("reviewer");

    let full = engine.mask_pii(text, &reviewer, "", Some(false));
    let preserved = engine.mask_pii(text, &reviewer, "", Some(true));

    assert_eq!(full.text, text);
    assert_eq!(preserved.text, text);
    assert_eq!(preserved.masked_count, 0);

    for role in ["auditor", "readonly", "reviewer"] {
        let role = Role::new(role);
        let full = engine.mask_pii(CASE_TEXT, &role, "", Some(false));
        let preserved = engine.mask_pii(CASE_TEXT, &role, "", Some(true));
        assert!(preserved.masked_count <= full.masked_count, "role {}", role);
    }
    Ok(())
}

#[test]
fn test_dates_and_birth_dates() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "Patient was born on 01/15/1980 and reported symptoms on 03/20/2024.";

    let dates: Vec<_> = engine
        .detect_pii(text, "")
        .detections
        .into_iter()
        .filter(|d| d.category == PiiCategory::Date)
        .collect();

    assert_eq!(dates.len(), 2);
    assert_eq!(dates[0].sensitivity, Sensitivity::Critical);
    assert_eq!(dates[0].replacement, "[DATE_OF_BIRTH]");
    assert_eq!(dates[1].sensitivity, Sensitivity::Medium);

    let preserved = engine.mask_pii(text, &Role::new("auditor"), "", Some(true));
    assert!(!preserved.text.contains("01/15/1980"));
    assert!(preserved.text.contains("03/20/2024"));
    Ok(())
}

#[test]
fn test_category_scenarios() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let cases = [
        ("Patient lives at 123 Main Street and can be reached at home.", PiiCategory::Address),
        ("Contact patient at (555) 123-4567 for follow-up.", PiiCategory::Phone),
        ("Patient's email is john.doe@email.com for communication.", PiiCategory::Email),
        ("Patient MRN: ABC123456 was admitted yesterday.", PiiCategory::MedicalRecordNumber),
    ];

    for (text, category) in cases {
        let report = engine.detect_pii(text, "");
        assert!(
            report.detections.iter().any(|d| d.category == category),
            "no {} in '{}'",
            category,
            text
        );
    }
    Ok(())
}

#[test]
fn test_clinical_vocabulary_is_not_a_name() -> Result<()> {
    let (engine, _t) = create_test_engine()?;

    let report = engine.detect_pii("Patient reported Adverse Event with Brand Name medication.", "");

    assert!(report
        .detections
        .iter()
        .all(|d| d.category != PiiCategory::Name));
    Ok(())
}

#[test]
fn test_custom_patterns_flow_through() -> Result<()> {
    let (mut config, _t) = create_test_config();
    config.pii_protection.custom_patterns = vec![r"\bpv-\d{4}\b".to_string()];
    let engine = ProtectionEngine::new(config)?;
    let text = "Reference PV-2024 attached.";

    let masked = engine.mask_pii(text, &Role::new("auditor"), "", Some(false));
    assert_eq!(masked.text, "Reference [CUSTOM_PII] attached.");

    let (anonymized, _) = engine.anonymize(text, "");
    assert_eq!(anonymized, "Reference [REDACTED] attached.");
    Ok(())
}

#[test]
fn test_skipped_custom_pattern_reported_as_warning() -> Result<()> {
    let toml = r#"
        [pii_protection]
        invalid_pattern_policy = "skip"
        custom_patterns = ["(unclosed", "LOT-\\d+"]
    "#;
    let mut config = ProtectionConfig::from_toml(toml)?;
    let temp_dir = TempDir::new()?;
    config.access_log.path = temp_dir.path().join("pii_access.log");
    let engine = ProtectionEngine::new(config)?;

    let report = engine.detect_pii("Batch LOT-881 recalled.", "");

    assert_eq!(report.warnings.len(), 1);
    assert!(report.detections.iter().any(|d| d.category == PiiCategory::Custom));
    Ok(())
}

#[test]
fn test_multibyte_text_masks_cleanly() -> Result<()> {
    let (engine, _t) = create_test_engine()?;
    let text = "Zoë née Müller: call 555-123-4567 ☎ today.";

    let outcome = engine.mask_pii(text, &Role::new("auditor"), "", Some(false));

    assert_eq!(outcome.text, "Zoë née Müller: call [PHONE] ☎ today.");
    Ok(())
}

#[test]
fn test_disabled_configuration() -> Result<()> {
    let (mut config, _t) = create_test_config();
    config.security.mask_pii = false;
    let engine = ProtectionEngine::new(config)?;
    let text = "John Smith reported symptoms.";

    assert!(engine.detect_pii(text, "").detections.is_empty());
    assert_eq!(engine.mask_pii(text, &Role::new("auditor"), "", None).text, text);

    let (anonymized, record) = engine.anonymize(text, "");
    assert_eq!(anonymized, text);
    assert_eq!(record.metadata.status, ProtectionStatus::Disabled);
    Ok(())
}
