use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, Compare, CompareOp, ConnectOptions, GetOptions, Identity, KvClient,
    SortOrder, SortTarget, TlsOptions, Txn, TxnOp,
};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::domain::rule::{rule_key, Rule, RULE_KEY_PREFIX};

use super::codec;
use super::error::StoreError;
use super::traits::{require_name, AddOutcome, RuleListing, RuleStore};

/// Rule store backed by an etcd v3 cluster.
///
/// Every key is scoped under the configured prefix. The handle wraps one
/// client connection and may be shared between concurrent reviews.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    prefix: String,
    command_timeout: Duration,
}

impl EtcdStore {
    /// Connect to the configured endpoints.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        // Per-call deadlines are enforced by `with_deadline` so they surface
        // as `StoreError::Timeout` rather than a gRPC status.
        let mut options = ConnectOptions::new().with_connect_timeout(config.dial_timeout());

        if let Some(tls) = tls_options(config).await? {
            options = options.with_tls(tls);
        }

        if let Some((user, password)) = config.credentials() {
            options = options.with_user(user, password);
        }

        let client = with_deadline(
            "connect",
            config.dial_timeout(),
            Client::connect(&config.endpoints, Some(options)),
        )
        .await?;

        info!(
            endpoints = ?config.endpoints,
            prefix = %config.prefix,
            "Connected to etcd"
        );

        Ok(EtcdStore {
            client,
            prefix: config.prefix.clone(),
            command_timeout: config.command_timeout(),
        })
    }

    /// Absolute key for a rule name.
    fn full_key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, rule_key(name))
    }

    /// Key with the store prefix removed, for error reporting.
    fn relative_key(&self, key: &[u8]) -> String {
        let key = String::from_utf8_lossy(key).into_owned();
        match key.strip_prefix(self.prefix.as_str()) {
            Some(relative) => relative.to_string(),
            None => key,
        }
    }

    fn kv(&self) -> KvClient {
        self.client.kv_client()
    }

    /// Run one store round trip under the command timeout.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, etcd_client::Error>>,
    {
        with_deadline(operation, self.command_timeout, fut).await
    }
}

/// Await an etcd call, failing with [`StoreError::Timeout`] once `after` elapses.
async fn with_deadline<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, etcd_client::Error>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout { operation, after }),
    }
}

impl fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtcdStore")
            .field("prefix", &self.prefix)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RuleStore for EtcdStore {
    async fn add(&self, rule: &Rule, override_existing: bool) -> Result<AddOutcome, StoreError> {
        rule.validate().map_err(StoreError::Validation)?;

        let key = self.full_key(&rule.name);

        // version == 0 means the key is absent
        let precondition = if override_existing {
            Compare::version(key.clone(), CompareOp::Greater, 0)
        } else {
            Compare::version(key.clone(), CompareOp::Equal, 0)
        };

        let txn = Txn::new()
            .when(vec![precondition])
            .and_then(vec![TxnOp::put(key, codec::encode(rule), None)]);

        let mut kv = self.kv();
        let response = self.timed("add", kv.txn(txn)).await?;

        if !response.succeeded() {
            debug!(rule = %rule.name, override_existing, "Conditional write rejected");
            return Err(StoreError::Conflict {
                name: rule.name.clone(),
                override_existing,
            });
        }

        Ok(if override_existing {
            AddOutcome::Replaced
        } else {
            AddOutcome::Created
        })
    }

    async fn get(&self, name: &str) -> Result<Rule, StoreError> {
        require_name(name)?;

        let key = self.full_key(name);
        let mut kv = self.kv();
        let response = self.timed("get", kv.get(key, None)).await?;

        match response.kvs().first() {
            Some(entry) => codec::decode(&self.relative_key(entry.key()), entry.value()),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn list(&self, limit: u64) -> Result<RuleListing, StoreError> {
        let prefix = format!("{}{}", self.prefix, RULE_KEY_PREFIX);
        let options = GetOptions::new()
            .with_prefix()
            .with_sort(SortTarget::Key, SortOrder::Ascend)
            .with_limit(i64::try_from(limit).unwrap_or(i64::MAX));

        let mut kv = self.kv();
        let response = self.timed("list", kv.get(prefix, Some(options))).await?;

        let rules = response
            .kvs()
            .iter()
            .map(|entry| codec::decode(&self.relative_key(entry.key()), entry.value()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuleListing {
            rules,
            total: u64::try_from(response.count()).unwrap_or_default(),
        })
    }

    async fn delete(&self, name: &str) -> Result<u64, StoreError> {
        require_name(name)?;

        let key = self.full_key(name);
        let mut kv = self.kv();
        let response = self.timed("delete", kv.delete(key, None)).await?;

        Ok(u64::try_from(response.deleted()).unwrap_or_default())
    }
}

/// Build the client TLS settings.
///
/// Any of cert/key/CA enables TLS. Without them TLS is still used with the
/// system roots unless insecure transport is requested.
async fn tls_options(config: &StoreConfig) -> Result<Option<TlsOptions>, StoreError> {
    let mut tls = None;

    match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => {
            let cert = read_pem(cert).await?;
            let key = read_pem(key).await?;
            tls = Some(TlsOptions::new().identity(Identity::from_pem(cert, key)));
        }
        (None, None) => {}
        _ => {
            return Err(StoreError::Tls(
                "client certificate and key must be given together".to_string(),
            ))
        }
    }

    if let Some(cacert) = &config.cacert {
        let ca = Certificate::from_pem(read_pem(cacert).await?);
        tls = Some(tls.unwrap_or_else(TlsOptions::new).ca_certificate(ca));
    }

    if tls.is_none() && !config.insecure_transport {
        tls = Some(TlsOptions::new());
    }

    if config.insecure_skip_tls_verify && tls.is_some() {
        return Err(StoreError::Tls(
            "skipping server certificate verification is not supported; \
             pass the server CA with --etcd-cacert or use --etcd-insecure-transport"
                .to_string(),
        ));
    }

    Ok(tls)
}

async fn read_pem(path: &std::path::Path) -> Result<Vec<u8>, StoreError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::Tls(format!("{}: {}", path.display(), e)))
}
