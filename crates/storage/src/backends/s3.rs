//! S3-compatible storage backend using AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ContinuationToken, ListingPage, ListingRequest, ObjectEntry, ObjectStore};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{instrument, warn};

/// Marker included in lazy-credentials errors so they surface as actionable
/// configuration errors instead of generic S3 transport failures.
const CREDENTIALS_INIT_ERROR_MARKER: &str = "nimbus-s3-lazy-credentials-init";
const CREDENTIALS_RESOLVE_ERROR_MARKER: &str = "nimbus-s3-lazy-credentials-resolve";

/// Object written and removed again by [`S3Backend::health_check`].
const HEALTH_CHECK_MARKER: &str = ".nimbus-health-check";

/// Lazily initializes the AWS default credentials chain on first signed request.
///
/// Building the chain has side effects (TLS roots, IMDS probing) that should
/// not happen when the backend is merely constructed.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<aws_config::default_provider::credentials::DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn build_chain(
        &self,
    ) -> Result<aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        let region = aws_config::Region::new(self.region.clone());

        tokio::task::spawn(async move {
            aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(region)
                .build()
                .await
        })
        .await
        .map_err(|join_err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_INIT_ERROR_MARKER}: failed to initialize AWS default credential chain: {join_err}"
            ))
        })
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self
            .chain
            .get_or_try_init(|| async { self.build_chain().await })
            .await?;
        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_RESOLVE_ERROR_MARKER}: default AWS credentials resolution failed: {err}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

/// Continuation token for the page after this one.
///
/// A truncated response without a token cannot be continued; treating it as
/// the last page would pass off a partial listing as complete.
fn next_page_token(
    is_truncated: Option<bool>,
    next_continuation_token: Option<&str>,
) -> StorageResult<Option<ContinuationToken>> {
    if is_truncated != Some(true) {
        return Ok(None);
    }
    match next_continuation_token {
        Some(next) => Ok(Some(ContinuationToken::new(next.as_bytes().to_vec())?)),
        None => Err(StorageError::S3(
            "truncated listing without a continuation token".into(),
        )),
    }
}

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let err_text = err.to_string();
    if err_text.contains(CREDENTIALS_INIT_ERROR_MARKER)
        || err_text.contains(CREDENTIALS_RESOLVE_ERROR_MARKER)
    {
        return StorageError::Config(
            "S3 credential initialization failed. Configure AWS credentials explicitly or ensure ambient AWS credentials are available."
                .to_string(),
        );
    }

    StorageError::S3(Box::new(err))
}

fn to_offset_date_time(dt: &aws_sdk_s3::primitives::DateTime) -> Option<OffsetDateTime> {
    let nanos = i128::from(dt.secs()) * 1_000_000_000 + i128::from(dt.subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// S3-compatible object store using AWS SDK.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Normalized endpoint, kept for diagnostics.
    endpoint: String,
    region: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`) instead of
    ///   virtual-hosted style (`bucket.endpoint/key`). Required for MinIO and some
    ///   S3-compatible services.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiration
                "nimbus-config",
            );
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            s3_config_builder = s3_config_builder
                .credentials_provider(LazyDefaultCredentialsProvider::new(resolved_region.clone()));
        }

        // Bare host:port endpoints (e.g., "minio:9000") get an http:// scheme.
        let normalized_endpoint = endpoint.as_ref().map(|endpoint_url| {
            let endpoint_lower = endpoint_url.to_lowercase();
            if endpoint_lower.starts_with("http://") || endpoint_lower.starts_with("https://") {
                endpoint_url.clone()
            } else {
                format!("http://{}", endpoint_url)
            }
        });

        if let Some(endpoint_url) = &normalized_endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let stored_endpoint = match &normalized_endpoint {
            Some(url) => url.clone(),
            None => format!("s3.{}.amazonaws.com", resolved_region),
        };

        // Strip trailing slashes to avoid double-slash keys like "prefix//key".
        let normalized_prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalized_prefix,
            endpoint: stored_endpoint,
            region: resolved_region,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a full object key.
    fn strip_prefix(&self, full_key: &str) -> String {
        match &self.prefix {
            Some(prefix) => {
                let prefix_with_slash = format!("{}/", prefix);
                full_key
                    .strip_prefix(&prefix_with_slash)
                    .unwrap_or(full_key)
                    .to_string()
            }
            None => full_key.to_string(),
        }
    }

    fn presigning_config(expires_in: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Config(format!("invalid presign expiry: {e}")))
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self, token), fields(backend = "s3"))]
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let page_size = request.page_size.clamp(1, 1000) as i32;
        let mut call = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.full_key(&request.prefix))
            .max_keys(page_size);

        if let Some(delimiter) = request.delimiter {
            call = call.delimiter(delimiter.to_string());
        }
        if let Some(token) = &token {
            call = call.continuation_token(token.as_str()?);
        }

        let output = call.send().await.map_err(|e| {
            // S3 answers 400 for a stale or malformed continuation token.
            if token.is_some()
                && let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = e
                && service_err.raw().status().as_u16() == 400
            {
                return StorageError::InvalidContinuationToken(
                    "S3 rejected continuation token".to_string(),
                );
            }
            map_s3_operation_error(e)
        })?;

        let mut page = ListingPage::default();
        for object in output.contents() {
            let Some(key) = object.key() else { continue };
            let last_modified = object
                .last_modified()
                .and_then(to_offset_date_time)
                .unwrap_or_else(|| {
                    warn!(key, "object has no usable last-modified time");
                    OffsetDateTime::UNIX_EPOCH
                });
            let size = object.size().unwrap_or_default().max(0) as u64;
            page.objects
                .push(ObjectEntry::new(self.strip_prefix(key), size, last_modified));
        }

        page.common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|common| common.prefix())
            .map(|prefix| self.strip_prefix(prefix))
            .collect();

        page.next_token =
            next_page_token(output.is_truncated(), output.next_continuation_token())?;

        Ok(page)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn presign_download(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .presigned(Self::presigning_config(expires_in)?)
            .await
            .map_err(map_s3_operation_error)?;
        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn presign_upload(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .presigned(Self::presigning_config(expires_in)?)
            .await
            .map_err(map_s3_operation_error)?;
        Ok(presigned.uri().to_string())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn ping(&self) -> StorageResult<()> {
        tokio::time::timeout(
            Duration::from_secs(10),
            self.client.head_bucket().bucket(&self.bucket).send(),
        )
        .await
        .map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "S3 ping timed out after 10 seconds",
            ))
        })?
        .map_err(map_s3_operation_error)?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let marker_key = self.full_key(HEALTH_CHECK_MARKER);

        let health_check_future = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(ByteStream::from_static(b"health-check"))
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            // Ignore NotFound from a concurrent cleanup.
            if let Err(e) = self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
                && !matches!(
                    &e,
                    aws_sdk_s3::error::SdkError::ServiceError(se) if se.raw().status().as_u16() == 404
                )
            {
                return Err(map_s3_operation_error(e));
            }

            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, health_check_future)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })?
    }
}
