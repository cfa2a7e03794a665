//! Pipeline delivery against a mocked FHIR server.

use studylift::config::load_config;
use studylift::core::pipeline::PipelineCoordinator;
use tempfile::TempDir;

const ODM_EXPORT: &str = r#"<ODM CreationDateTime="2024-05-10T09:15:00">
    <ClinicalData StudyOID="teststudy">
        <SubjectData SubjectKey="P-007">
            <StudyEventData StudyEventOID="BASIS">
                <FormData FormOID="teststudy.demographie">
                    <ItemGroupData ItemGroupOID="demographie.g1">
                        <ItemData ItemOID="alter" Value="63"/>
                    </ItemGroupData>
                </FormData>
            </StudyEventData>
        </SubjectData>
    </ClinicalData>
</ODM>"#;

fn write_config(dir: &TempDir, server_url: &str) -> String {
    let odm_path = dir.path().join("export.xml");
    std::fs::write(&odm_path, ODM_EXPORT).unwrap();

    let config = format!(
        r#"
[odm]
source = "file"

[odm.file]
path = "{odm}"

[mapping]
subject_keys_hashed = false
debug_identifiers = true

[fhir]
target = "server"

[fhir.server]
base_url = "{server}"
username = "studylift"
password = "test-password"
max_attempts = 2
retry_delay_ms = 10

[logging]
local_enabled = false
"#,
        odm = odm_path.display(),
        server = server_url,
    );

    let config_path = dir.path().join("studylift.toml");
    std::fs::write(&config_path, config).unwrap();
    config_path.to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_bundle_is_posted_as_transaction() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"resourceType": "Bundle", "type": "transaction"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"resourceType": "Bundle", "type": "transaction-response"}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &server.url());
    let config = load_config(&config_path).unwrap();
    config.validate().unwrap();

    let mut coordinator = PipelineCoordinator::from_config(&config).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.bundles_written, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_transaction_fails_the_run() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(422)
        .with_body("bundle rejected")
        .expect(2)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &server.url());
    let config = load_config(&config_path).unwrap();

    let mut coordinator = PipelineCoordinator::from_config(&config).unwrap();
    let error = coordinator.run().await.unwrap_err();

    assert!(error.to_string().contains("2 attempts"));
    mock.assert_async().await;
}
