//! 스테이징용 오브젝트 스토리지.
//!
//! `object_store` 위의 얇은 래퍼로, Google Cloud Storage 버킷 또는 로컬 디렉토리에
//! Parquet 버퍼를 업로드하고 다시 읽어옵니다.

use std::path::Path as FsPath;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use crate::Result;

/// 스테이징 스토어
#[derive(Debug, Clone)]
pub struct StagingStore {
    store: Arc<dyn ObjectStore>,
    /// 로그 표시용 이름 (버킷 또는 디렉토리)
    name: String,
}

impl StagingStore {
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// 메모리 스토어 (테스트용)
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    /// 로컬 디렉토리 스토어. 디렉토리가 없으면 생성합니다.
    pub fn local(dir: &FsPath) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let store = LocalFileSystem::new_with_prefix(dir)?;
        Ok(Self::new(Arc::new(store), dir.display().to_string()))
    }

    /// Google Cloud Storage 버킷 스토어.
    ///
    /// 서비스 계정 키 파일이 없으면 환경 변수(`GOOGLE_*`)의 자격 증명을 사용합니다.
    pub fn google_cloud(bucket: &str, credentials: Option<&FsPath>) -> Result<Self> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(path) = credentials {
            builder = builder.with_service_account_path(path.to_string_lossy());
        }
        let store = builder.build()?;
        Ok(Self::new(Arc::new(store), format!("gs://{}", bucket)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 바이트 버퍼 업로드 (같은 경로는 덮어씀)
    pub async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<()> {
        let size = bytes.len();
        self.store
            .put(&Path::from(path), PutPayload::from_bytes(Bytes::from(bytes)))
            .await?;
        tracing::debug!(store = %self.name, path, size, "업로드 완료");
        Ok(())
    }

    /// 객체 다운로드
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let result = self.store.get(&Path::from(path)).await?;
        let bytes = result.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// 접두사 아래의 Parquet 객체 경로 목록 (정렬됨)
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = Path::from(prefix);
        let metas: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;

        let mut paths: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|location| location.ends_with(".parquet"))
            .collect();
        paths.sort();
        Ok(paths)
    }
}
