//! End-to-end registration, lookup and verification against in-memory
//! collaborators.

use async_trait::async_trait;
use nexo_chain::{Transaction, TransactionOutput};
use nexo_core::{
    AnchorError, AnchorEvent, AnchorSettings, CreateTransactionRequest, CreateTransactionResponse,
    Explorer, FailureKind, Observer, Orchestrator, RegistrationRequest, RegistrationStage,
    ServiceError, ValidationPolicy, Wallet,
};
use nexo_crypto::PersonalRecord;
use nexo_index::{IndexError, IndexRecord, IndexStore, JsonFileIndex, RecordIndex};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const IDENTITY_KEY: &str = "02f1e2d3c4b5a697887766554433221100ffeeddccbbaa99887766554433221100";

/// Wallet and explorer backed by the same in-memory "chain".
///
/// Every created transaction gets a P2PKH change output first and the
/// requested data-carrier output second, the way a real wallet lays it out.
#[derive(Default)]
struct MockLedger {
    transactions: Mutex<HashMap<String, Transaction>>,
    requests: Mutex<Vec<CreateTransactionRequest>>,
    fail_submissions: bool,
    fail_fetches: bool,
}

impl MockLedger {
    fn submissions(&self) -> Vec<CreateTransactionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn replace(&self, txid: &str, tx: Transaction) {
        self.transactions.lock().unwrap().insert(txid.to_string(), tx);
    }
}

#[async_trait]
impl Wallet for MockLedger {
    async fn identity_key(&self) -> Result<String, ServiceError> {
        Ok(IDENTITY_KEY.to_string())
    }

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreateTransactionResponse, ServiceError> {
        if self.fail_submissions {
            return Err(ServiceError::Unavailable("wallet is locked".to_string()));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let txid = format!("{:064x}", requests.len());

        let change = TransactionOutput::from_script(0, &[0x76, 0xa9, 0x14, 0x00, 0x88, 0xac])
            .with_script_type("pubkeyhash");
        let script = hex::decode(&request.outputs[0].locking_script).unwrap();
        let carrier = TransactionOutput::from_script(1, &script).with_script_type("nulldata");
        self.replace(&txid, Transaction::new(txid.clone(), vec![change, carrier]));

        Ok(CreateTransactionResponse { txid })
    }
}

#[async_trait]
impl Explorer for MockLedger {
    async fn fetch_transaction(&self, txid: &str) -> Result<Transaction, ServiceError> {
        if self.fail_fetches {
            return Err(ServiceError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        self.transactions
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| ServiceError::TransactionNotFound(txid.to_string()))
    }
}

/// Explorer that never answers in time
struct SlowExplorer;

#[async_trait]
impl Explorer for SlowExplorer {
    async fn fetch_transaction(&self, _txid: &str) -> Result<Transaction, ServiceError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(ServiceError::Unavailable("unreachable".to_string()))
    }
}

/// Index whose writes always fail
struct ReadOnlyIndex;

impl RecordIndex for ReadOnlyIndex {
    fn load(&self) -> IndexStore {
        IndexStore::empty()
    }

    fn append(&self, _record: IndexRecord) -> nexo_index::Result<()> {
        Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }

    fn clear(&self) -> nexo_index::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<AnchorEvent>>,
}

impl RecordingObserver {
    fn registration_stages(&self) -> Vec<RegistrationStage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                AnchorEvent::Registration { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &AnchorEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    _dir: TempDir,
    ledger: Arc<MockLedger>,
    index: Arc<JsonFileIndex>,
    orchestrator: Orchestrator,
}

fn settings() -> AnchorSettings {
    AnchorSettings {
        timeout: Duration::from_secs(5),
        ..AnchorSettings::default()
    }
}

fn harness_with(ledger: MockLedger, settings: AnchorSettings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ledger);
    let index = Arc::new(JsonFileIndex::open(dir.path().join("identity-records.json")));
    let orchestrator = Orchestrator::new(ledger.clone(), ledger.clone(), index.clone(), settings);
    Harness {
        _dir: dir,
        ledger,
        index,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(MockLedger::default(), settings())
}

fn ana() -> PersonalRecord {
    PersonalRecord::new()
        .with_field("nombre", "Ana")
        .with_field("apellidos", "García López")
        .with_field("dni", "111")
        .with_field("fechaNacimiento", "1990-04-12")
        .with_field("tipoDiscapacidad", "visual")
        .with_field("gradoDiscapacidad", 75)
        .with_field("tecnologiasApoyo", serde_json::json!(["lector de pantalla", "braille"]))
}

fn ana_request() -> RegistrationRequest {
    RegistrationRequest::new(ana(), "K1", "ONCE-2025-AAA111", "111")
}

#[tokio::test]
async fn register_then_lookup_returns_original_record() {
    let h = harness();

    let receipt = h.orchestrator.register(ana_request()).await.unwrap();
    assert_eq!(receipt.stage, RegistrationStage::Done);
    assert!(receipt.warning.is_none());
    assert_eq!(receipt.case_id, "ONCE-2025-AAA111");
    assert_eq!(receipt.transaction_id, format!("{:064x}", 1));
    assert_eq!(
        receipt.explorer_url,
        format!("https://whatsonchain.com/tx/{}", receipt.transaction_id)
    );
    assert_eq!(receipt.envelope.key_hash, nexo_crypto::key_hash("K1"));
    assert_eq!(receipt.envelope.identity_key, IDENTITY_KEY);
    assert_eq!(receipt.envelope.issuer, "ONCE");

    let found = h.orchestrator.lookup("ONCE-2025-AAA111").await.unwrap();
    assert_eq!(found.record, ana());
    assert_eq!(found.transaction_id, receipt.transaction_id);
    assert_eq!(found.envelope, receipt.envelope);
}

#[tokio::test]
async fn wallet_request_carries_the_data_carrier_script() {
    let h = harness();
    h.orchestrator.register(ana_request()).await.unwrap();

    let submissions = h.ledger.submissions();
    assert_eq!(submissions.len(), 1);
    let request = &submissions[0];
    assert_eq!(request.description, "ONCE - Acreditación ONCE-2025-AAA111");
    assert!(!request.options.randomize_outputs);
    assert_eq!(request.outputs.len(), 1);
    assert_eq!(request.outputs[0].satoshis, 1);
    assert_eq!(
        request.outputs[0].output_description,
        "Acreditación ONCE - Exp: ONCE-2025-AAA111"
    );
    assert!(request.outputs[0].locking_script.starts_with("006a"));

    let script = hex::decode(&request.outputs[0].locking_script).unwrap();
    let payload = nexo_chain::decode_data_carrier_script(&script).unwrap();
    let envelope = nexo_chain::unwrap(payload).unwrap();
    assert_eq!(envelope.case_id, "ONCE-2025-AAA111");
    assert_eq!(envelope.algorithm_tag, nexo_crypto::ALGORITHM);
}

#[tokio::test]
async fn registration_is_indexed_with_key_and_hash() {
    let h = harness();
    let receipt = h
        .orchestrator
        .register(ana_request().with_issuer("IMSERSO").with_identity_key("03abcd"))
        .await
        .unwrap();

    let entry = h.index.find_by_case_id("ONCE-2025-AAA111").unwrap();
    assert_eq!(entry.transaction_id, receipt.transaction_id);
    assert_eq!(entry.record_id, receipt.record_id);
    assert_eq!(entry.symmetric_key, "K1");
    assert_eq!(entry.subject_id, "111");
    assert_eq!(entry.issuer, "IMSERSO");
    assert_eq!(entry.identity_key, "03abcd");
    assert!(entry.key_hash_matches());
    assert_eq!(h.index.find_by_transaction_id(&receipt.transaction_id).unwrap().case_id, "ONCE-2025-AAA111");
}

#[tokio::test]
async fn index_failure_after_submission_is_success_with_warning() {
    let ledger = Arc::new(MockLedger::default());
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = Orchestrator::new(ledger.clone(), ledger.clone(), Arc::new(ReadOnlyIndex), settings())
        .with_observer(observer.clone());

    let receipt = orchestrator.register(ana_request()).await.unwrap();

    assert_eq!(receipt.stage, RegistrationStage::PersistedOnChainOnly);
    assert!(!receipt.is_indexed());
    let warning = receipt.warning.unwrap();
    assert!(warning.contains(&receipt.transaction_id));
    assert!(warning.contains("read-only filesystem"));
    assert_eq!(receipt.transaction_id, format!("{:064x}", 1));
    assert_eq!(ledger.submissions().len(), 1);

    let stages = observer.registration_stages();
    assert_eq!(stages.last(), Some(&RegistrationStage::PersistedOnChainOnly));
    assert!(observer
        .events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, AnchorEvent::IndexWriteFailed { .. })));
}

#[tokio::test]
async fn registration_walks_every_stage() {
    let h = harness();
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = Orchestrator::new(h.ledger.clone(), h.ledger.clone(), h.index.clone(), settings())
        .with_observer(observer.clone());

    orchestrator.register(ana_request()).await.unwrap();

    assert_eq!(
        observer.registration_stages(),
        vec![
            RegistrationStage::Validating,
            RegistrationStage::Encrypting,
            RegistrationStage::Encoding,
            RegistrationStage::Submitting,
            RegistrationStage::Persisting,
            RegistrationStage::Done,
        ]
    );
}

#[tokio::test]
async fn invalid_request_never_reaches_the_wallet() {
    let h = harness_with(
        MockLedger::default(),
        AnchorSettings {
            validation: ValidationPolicy::accreditation(),
            ..settings()
        },
    );

    let mut request = RegistrationRequest::new(PersonalRecord::new().with_field("nombre", "Ana"), "", "", "111");
    request.timestamp = Some("last tuesday".to_string());

    let err = h.orchestrator.register(request).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidRequest);
    match err {
        AnchorError::Validation(problems) => {
            assert!(problems.iter().any(|p| p.contains("symmetric key")));
            assert!(problems.iter().any(|p| p.contains("case id")));
            assert!(problems.iter().any(|p| p.contains("`dni`")));
            assert!(problems.iter().any(|p| p.contains("RFC 3339")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(h.ledger.submissions().is_empty());
    assert!(h.index.all_records().is_empty());
}

#[tokio::test]
async fn wallet_failure_fails_registration() {
    let h = harness_with(
        MockLedger {
            fail_submissions: true,
            ..MockLedger::default()
        },
        settings(),
    );

    let err = h.orchestrator.register(ana_request()).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::UpstreamUnavailable);
    assert!(matches!(err, AnchorError::UpstreamUnavailable { service: "wallet", .. }));
    assert!(h.index.all_records().is_empty());
}

#[tokio::test]
async fn oversized_record_is_rejected_before_submission() {
    let h = harness();
    let big = PersonalRecord::new().with_field("notas", "x".repeat(nexo_chain::MAX_DATA_CARRIER_PAYLOAD));

    let err = h
        .orchestrator
        .register(RegistrationRequest::new(big, "K1", "ONCE-2025-BIG000", "111"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::PayloadTooLarge);
    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn lookup_of_unknown_case_is_not_found_locally() {
    let h = harness();
    let err = h.orchestrator.lookup("ONCE-2025-NOPE00").await.unwrap_err();
    assert!(matches!(err, AnchorError::RecordNotFound { .. }));
    assert_eq!(err.kind(), FailureKind::NotFoundLocally);
}

#[tokio::test]
async fn lookup_and_verify_ignore_surrounding_whitespace() {
    let h = harness();
    h.orchestrator.register(ana_request()).await.unwrap();

    let found = h.orchestrator.lookup("  ONCE-2025-AAA111\n").await.unwrap();
    assert_eq!(found.case_id, "ONCE-2025-AAA111");
    assert_eq!(found.record, ana());

    let report = h.orchestrator.verify(" ONCE-2025-AAA111 ").await.unwrap();
    assert!(report.verified);

    let err = h.orchestrator.lookup("   ").await.unwrap_err();
    assert!(matches!(err, AnchorError::Validation(_)));
}

#[tokio::test]
async fn lookup_with_failing_explorer_is_upstream_unavailable() {
    let h = harness();
    h.orchestrator.register(ana_request()).await.unwrap();

    let broken = Arc::new(MockLedger {
        fail_fetches: true,
        ..MockLedger::default()
    });
    let orchestrator = Orchestrator::new(h.ledger.clone(), broken, h.index.clone(), settings());

    let err = orchestrator.lookup("ONCE-2025-AAA111").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::UpstreamUnavailable);
}

#[tokio::test]
async fn explorer_timeout_is_upstream_unavailable() {
    let h = harness();
    h.orchestrator.register(ana_request()).await.unwrap();

    let orchestrator = Orchestrator::new(
        h.ledger.clone(),
        Arc::new(SlowExplorer),
        h.index.clone(),
        AnchorSettings {
            timeout: Duration::from_millis(50),
            ..settings()
        },
    );

    let err = orchestrator.lookup("ONCE-2025-AAA111").await.unwrap_err();
    assert!(matches!(err, AnchorError::UpstreamUnavailable { service: "explorer", .. }));
}

#[tokio::test]
async fn lookup_with_wrong_indexed_key_is_decryption_error() {
    let h = harness();
    h.orchestrator.register(ana_request()).await.unwrap();

    let mut entry = h.index.find_by_case_id("ONCE-2025-AAA111").unwrap();
    entry.symmetric_key = "K2".to_string();
    h.index.clear().unwrap();
    h.index.append(entry).unwrap();

    let err = h.orchestrator.lookup("ONCE-2025-AAA111").await.unwrap_err();
    assert!(matches!(err, AnchorError::Decryption));
    assert_eq!(err.kind(), FailureKind::WrongOrCorruptKey);
}

#[tokio::test]
async fn lookup_of_transaction_without_envelope_is_protocol_mismatch() {
    let h = harness();
    let receipt = h.orchestrator.register(ana_request()).await.unwrap();

    let foreign = br#"{"protocol":"B://","data":"hello"}"#;
    let script = nexo_chain::build_data_carrier_script(foreign).unwrap();
    h.ledger.replace(
        &receipt.transaction_id,
        Transaction::new(
            receipt.transaction_id.clone(),
            vec![TransactionOutput::from_script(0, &script)],
        ),
    );

    let err = h.orchestrator.lookup("ONCE-2025-AAA111").await.unwrap_err();
    assert!(matches!(err, AnchorError::Decode(_)));
    assert_eq!(err.kind(), FailureKind::ProtocolMismatch);
}

#[tokio::test]
async fn verify_after_registration() {
    let h = harness_with(
        MockLedger::default(),
        AnchorSettings {
            network: nexo_core::Network::Test,
            ..settings()
        },
    );
    let receipt = h
        .orchestrator
        .register(ana_request().with_timestamp("2025-03-01T10:00:00.000Z"))
        .await
        .unwrap();

    let report = h.orchestrator.verify("ONCE-2025-AAA111").await.unwrap();
    assert!(report.verified);
    assert!(report.case_id_matches && report.key_hash_matches && report.ciphertext_matches);
    assert_eq!(report.transaction_id, receipt.transaction_id);
    assert_eq!(report.timestamp, "2025-03-01T10:00:00.000Z");
    assert!(report.explorer_url.starts_with("https://test.whatsonchain.com/tx/"));
}

#[tokio::test]
async fn verify_detects_key_hash_mismatch() {
    let h = harness();
    h.orchestrator.register(ana_request()).await.unwrap();

    let mut entry = h.index.find_by_case_id("ONCE-2025-AAA111").unwrap();
    entry.symmetric_key = "K2".to_string();
    entry.key_hash = nexo_crypto::key_hash("K2");
    h.index.clear().unwrap();
    h.index.append(entry).unwrap();

    let report = h.orchestrator.verify("ONCE-2025-AAA111").await.unwrap();
    assert!(!report.verified);
    assert!(!report.key_hash_matches);
    assert!(report.index_key_consistent);
    assert!(report.ciphertext_matches);
}

#[tokio::test]
async fn concurrent_registrations_are_all_indexed() {
    let h = harness();
    let orchestrator = Arc::new(h.orchestrator);

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let request = RegistrationRequest::new(ana(), "K1", format!("ONCE-2025-PAR{i:03}"), "111");
                orchestrator.register(request).await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().stage, RegistrationStage::Done);
    }

    assert_eq!(h.index.all_records().len(), 6);
    assert_eq!(h.index.find_by_subject_id("111").len(), 6);
    for i in 0..6 {
        let found = orchestrator.lookup(&format!("ONCE-2025-PAR{i:03}")).await.unwrap();
        assert_eq!(found.record, ana());
    }
}
