pub mod checkin;
pub mod ingest;

pub use checkin::{
    CheckinFiles, CheckinOperation, CheckinOperationRequest, CheckinStatus, CheckinVersions,
};
pub use ingest::{
    IngestOperation, IngestOperationOutcome, IngestOperationRequest, TransferResult,
    TransferStatus,
};
