//! Thin RPC façade over `Journal`: produce, consume, commit. Demonstration
//! surface only -- no auth, no consumer groups, no replication.
use crate::errors::{JournalError, NetworkError};
use crate::journal::Journal;
use proto::{CommitRequest, CommitResponse, ConsumeRequest, ConsumeResponse, ProduceRequest, ProduceResponse};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub mod proto {
    tonic::include_proto!("log.v1");
}

trait IntoStatus {
    fn into_status(self) -> Status;
}

impl IntoStatus for JournalError {
    fn into_status(self) -> Status {
        match &self {
            JournalError::Log(crate::errors::LogError::OffsetNotFound { offset, .. }) => {
                Status::not_found(format!("offset {offset} not found"))
            }
            JournalError::Log(crate::errors::LogError::OffsetOutOfRange { offset, .. }) => {
                Status::out_of_range(format!("offset {offset} has already been retained away"))
            }
            JournalError::Log(crate::errors::LogError::BatchTooLarge { .. }) => {
                Status::invalid_argument(self.to_string())
            }
            JournalError::Config(_) => Status::invalid_argument(self.to_string()),
            _ => Status::internal(self.to_string()),
        }
    }
}

impl IntoStatus for NetworkError {
    fn into_status(self) -> Status {
        match &self {
            NetworkError::LockPoisoned => Status::internal("journal lock poisoned"),
            NetworkError::TaskFailed(msg) => Status::internal(format!("background task failed: {msg}")),
            _ => Status::internal(self.to_string()),
        }
    }
}

pub struct LogService {
    journal: Arc<Journal>,
}

impl LogService {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

#[tonic::async_trait]
impl proto::log_server::Log for LogService {
    async fn produce(
        &self,
        request: Request<ProduceRequest>,
    ) -> Result<Response<ProduceResponse>, Status> {
        let req = request.into_inner();
        let journal = Arc::clone(&self.journal);

        let offset = tokio::task::spawn_blocking(move || {
            journal
                .write(&[(req.key, req.payload)])
                .map(|(first, _last)| first)
        })
        .await
        .map_err(|e| NetworkError::TaskFailed(e.to_string()).into_status())?
        .map_err(|e| e.into_status())?;

        Ok(Response::new(ProduceResponse { offset }))
    }

    async fn consume(
        &self,
        request: Request<ConsumeRequest>,
    ) -> Result<Response<ConsumeResponse>, Status> {
        let req = request.into_inner();
        let journal = Arc::clone(&self.journal);

        let records = tokio::task::spawn_blocking(move || {
            let max_bytes = if req.max_bytes == 0 {
                1024 * 1024
            } else {
                req.max_bytes
            };
            journal.read(req.offset, max_bytes, None)
        })
        .await
        .map_err(|e| NetworkError::TaskFailed(e.to_string()).into_status())?
        .map_err(|e| e.into_status())?;

        let next_offset = records
            .last()
            .map(|r| r.offset + 1)
            .unwrap_or(req.offset);

        let records = records
            .into_iter()
            .map(|r| proto::Record {
                offset: r.offset,
                key: r.key,
                payload: r.payload,
            })
            .collect();

        Ok(Response::new(ConsumeResponse {
            records,
            next_offset,
        }))
    }

    async fn commit(
        &self,
        request: Request<CommitRequest>,
    ) -> Result<Response<CommitResponse>, Status> {
        let offset = request.into_inner().offset;
        self.journal.mark_committed(offset);
        let committed_offset = self.journal.committed_offset().unwrap_or(offset);
        Ok(Response::new(CommitResponse { committed_offset }))
    }
}
