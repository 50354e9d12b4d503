// src/services/permission_cache.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use backoff::{future::retry_notify, ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    common::error::FetchError,
    models::permissions::{Capability, EffectivePermissions, Limit, LimitValue},
    services::permission_client::{PermissionSource, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Errored,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Teto de cada tentativa de busca.
    pub fetch_timeout: Duration,
    /// Tentativas extras depois da primeira (só para falhas de rede e timeout).
    pub max_retries: u32,
    /// Espera antes da primeira nova tentativa; dobra a cada tentativa.
    pub retry_backoff: Duration,
    /// Teto da espera entre tentativas.
    pub max_backoff: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Cache das permissões efetivas da sessão ativa.
///
/// Leituras (`get`, `get_limit`) são síncronas e nunca esperam pela rede.
/// Só existe uma busca em andamento por vez; `invalidate()` durante uma
/// busca é agrupado nela. Cada `init`/`teardown` avança a época, e
/// respostas de uma época antiga são descartadas quando chegam.
///
/// `init` e `invalidate` disparam a busca com `tokio::spawn`, então
/// precisam ser chamados dentro de um runtime Tokio.
#[derive(Clone)]
pub struct PermissionCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    source: Arc<dyn PermissionSource>,
    settings: CacheSettings,
    state: Mutex<CacheState>,
    status_tx: watch::Sender<CacheStatus>,
}

#[derive(Default)]
struct CacheState {
    status: CacheStatus,
    session: Option<Session>,
    // Último snapshot bom; sobrevive a Loading e Errored
    snapshot: Option<Arc<EffectivePermissions>>,
    last_error: Option<FetchError>,
    fetched_at: Option<DateTime<Utc>>,
    epoch: u64,
    in_flight: bool,
}

impl PermissionCache {
    pub fn new(source: Arc<dyn PermissionSource>, settings: CacheSettings) -> Self {
        let (status_tx, _) = watch::channel(CacheStatus::Uninitialized);

        Self {
            inner: Arc::new(CacheInner {
                source,
                settings,
                state: Mutex::new(CacheState::default()),
                status_tx,
            }),
        }
    }

    /// Início de sessão: descarta tudo da sessão anterior e busca.
    pub fn init(&self, session: Session) {
        let mut state = self.inner.lock();
        let epoch = state.epoch + 1;
        *state = CacheState {
            epoch,
            session: Some(session),
            ..CacheState::default()
        };

        tracing::info!(epoch, "Sessão iniciada, carregando permissões");
        self.start_fetch(&mut state);
    }

    /// Força nova busca sem bloquear quem chamou.
    pub fn invalidate(&self) {
        let mut state = self.inner.lock();

        if state.in_flight {
            tracing::debug!(epoch = state.epoch, "Busca já em andamento, invalidação agrupada");
            return;
        }

        // Sem sessão (antes do init ou depois do logout) não há o que recarregar
        if state.session.is_none() {
            tracing::debug!(epoch = state.epoch, "Nenhuma sessão ativa, invalidação ignorada");
            return;
        }

        self.start_fetch(&mut state);
    }

    /// Fim de sessão (logout): volta a Uninitialized sem nada em cache.
    pub fn teardown(&self) {
        let mut state = self.inner.lock();
        let epoch = state.epoch + 1;
        *state = CacheState {
            epoch,
            ..CacheState::default()
        };

        tracing::info!(epoch, "Sessão encerrada, permissões descartadas");
        self.inner.publish(&state);
    }

    pub fn get(&self, capability: Capability) -> bool {
        self.serving_snapshot()
            .map_or(capability.default_value(), |permissions| permissions.allows(capability))
    }

    pub fn get_limit(&self, limit: Limit) -> LimitValue {
        self.serving_snapshot()
            .map_or(LimitValue::Limited(0), |permissions| permissions.limit(limit))
    }

    /// O snapshot que `get` está servindo agora, se houver.
    pub fn snapshot(&self) -> Option<Arc<EffectivePermissions>> {
        self.serving_snapshot()
    }

    pub fn status(&self) -> CacheStatus {
        self.inner.lock().status
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.inner.lock().last_error.clone()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().fetched_at
    }

    /// Para quem quer reagir a mudanças (indicador de carregamento, re-render).
    pub fn subscribe(&self) -> watch::Receiver<CacheStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Espera sair de Loading e devolve o estado em que parou.
    pub async fn settled(&self) -> CacheStatus {
        let mut rx = self.subscribe();
        match rx.wait_for(|status| *status != CacheStatus::Loading).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    // Sem snapshot confirmado nesta sessão (primeira carga, logout) vale o fail-closed.
    // Recarga e falha continuam servindo o último snapshot bom.
    fn serving_snapshot(&self) -> Option<Arc<EffectivePermissions>> {
        let state = self.inner.lock();
        match state.status {
            CacheStatus::Uninitialized => None,
            CacheStatus::Loading | CacheStatus::Ready | CacheStatus::Errored => state.snapshot.clone(),
        }
    }

    fn start_fetch(&self, state: &mut CacheState) {
        let session = match &state.session {
            Some(session) if !session.token.trim().is_empty() => session.clone(),
            _ => {
                // AuthMissing: falha rápida, nenhuma requisição sai
                tracing::warn!(epoch = state.epoch, "Sem token de sessão, permissões não serão buscadas");
                state.status = CacheStatus::Errored;
                state.last_error = Some(FetchError::AuthMissing);
                self.inner.publish(state);
                return;
            }
        };

        state.status = CacheStatus::Loading;
        state.in_flight = true;
        self.inner.publish(state);

        let epoch = state.epoch;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.fetch_with_retry(&session).await;
            inner.complete(epoch, result);
        });
    }
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &CacheState) {
        self.status_tx.send_replace(state.status);
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.retry_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.settings.max_backoff)
            // Quem encerra é a contagem de tentativas, não o relógio
            .with_max_elapsed_time(None)
            .build()
    }

    async fn fetch_with_retry(&self, session: &Session) -> Result<EffectivePermissions, FetchError> {
        let attempts = &AtomicU32::new(0);
        let source = &*self.source;
        let fetch_timeout = self.settings.fetch_timeout;
        let max_retries = self.settings.max_retries;

        retry_notify(
            self.backoff(),
            move || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);

                let result = match tokio::time::timeout(
                    fetch_timeout,
                    source.fetch_effective_permissions(session),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(fetch_timeout)),
                };

                // Só rede e timeout valem nova tentativa, e só até o limite configurado
                result.map_err(|error| {
                    if error.is_retryable() && attempt < max_retries {
                        backoff::Error::transient(error)
                    } else {
                        backoff::Error::permanent(error)
                    }
                })
            },
            move |error: FetchError, delay: Duration| {
                tracing::warn!(
                    attempt = attempts.load(Ordering::SeqCst),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Falha ao buscar permissões, tentando de novo"
                );
            },
        )
        .await
    }

    fn complete(&self, epoch: u64, result: Result<EffectivePermissions, FetchError>) {
        let mut state = self.lock();

        // Sessão encerrada ou reiniciada enquanto a busca rodava
        if state.epoch != epoch {
            tracing::debug!(epoch, current = state.epoch, "Resposta de sessão antiga descartada");
            return;
        }

        state.in_flight = false;
        match result {
            Ok(permissions) => {
                tracing::info!(
                    epoch,
                    granted = permissions.granted().count(),
                    "✅ Permissões carregadas"
                );
                state.snapshot = Some(Arc::new(permissions));
                state.last_error = None;
                state.fetched_at = Some(Utc::now());
                state.status = CacheStatus::Ready;
            }
            Err(error) => {
                tracing::warn!(
                    epoch,
                    error = %error,
                    stale = state.snapshot.is_some(),
                    "🔥 Falha ao carregar permissões"
                );
                state.last_error = Some(error);
                state.status = CacheStatus::Errored;
            }
        }

        self.publish(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    // Fonte falsa: conta chamadas, segura cada busca até o teste liberar.
    struct FakeSource {
        responses: Mutex<VecDeque<Result<EffectivePermissions, FetchError>>>,
        calls: AtomicUsize,
        gate: Semaphore,
        delay: Duration,
    }

    impl FakeSource {
        fn new(responses: Vec<Result<EffectivePermissions, FetchError>>, permits: usize) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(permits),
                delay: Duration::ZERO,
            })
        }

        fn open(responses: Vec<Result<EffectivePermissions, FetchError>>) -> Arc<Self> {
            Self::new(responses, Semaphore::MAX_PERMITS)
        }

        fn gated(responses: Vec<Result<EffectivePermissions, FetchError>>) -> Arc<Self> {
            Self::new(responses, 0)
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
                delay,
            })
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionSource for FakeSource {
        async fn fetch_effective_permissions(
            &self,
            _session: &Session,
        ) -> Result<EffectivePermissions, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.expect("gate fechado").forget();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(EffectivePermissions::denied()))
        }
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            fetch_timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        }
    }

    fn session() -> Session {
        Session::new("token-valido", Uuid::new_v4())
    }

    fn vendors(flag: bool, max_users: u64) -> EffectivePermissions {
        EffectivePermissions::from_fn(
            |c| flag && c == Capability::CanCreateVendors,
            |l| match l {
                Limit::MaxUsers => LimitValue::Limited(max_users),
                _ => LimitValue::Limited(0),
            },
        )
    }

    #[tokio::test]
    async fn starts_uninitialized_and_fail_closed() {
        let cache = PermissionCache::new(FakeSource::open(vec![]), settings());

        assert_eq!(cache.status(), CacheStatus::Uninitialized);
        assert!(!cache.get(Capability::CanCreateVendors));
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(0));
    }

    #[tokio::test]
    async fn first_load_is_fail_closed_then_ready_serves_snapshot() {
        let source = FakeSource::gated(vec![Ok(vendors(true, 5))]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.init(session());
        assert_eq!(cache.status(), CacheStatus::Loading);
        assert!(!cache.get(Capability::CanCreateVendors));

        source.release();
        assert_eq!(cache.settled().await, CacheStatus::Ready);
        assert!(cache.get(Capability::CanCreateVendors));
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(5));
        assert!(cache.fetched_at().is_some());
    }

    #[tokio::test]
    async fn concurrent_invalidations_share_one_fetch() {
        let source = FakeSource::gated(vec![Ok(vendors(true, 5)), Ok(vendors(true, 5))]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.init(session());
        source.release();
        assert_eq!(cache.settled().await, CacheStatus::Ready);
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(5));
        assert_eq!(source.calls(), 1);

        cache.invalidate();
        cache.invalidate();
        cache.invalidate();
        assert_eq!(cache.status(), CacheStatus::Loading);
        // Recarga não derruba o snapshot já confirmado
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(5));
        source.release();

        assert_eq!(cache.settled().await, CacheStatus::Ready);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_refetch_keeps_serving_stale_snapshot() {
        let source = FakeSource::open(vec![
            Ok(vendors(true, 5)),
            Err(FetchError::FetchFailed("conexão recusada".into())),
            Ok(vendors(false, 5)),
        ]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.init(session());
        assert_eq!(cache.settled().await, CacheStatus::Ready);

        cache.invalidate();
        assert_eq!(cache.settled().await, CacheStatus::Errored);
        assert!(cache.get(Capability::CanCreateVendors));
        assert!(matches!(cache.last_error(), Some(FetchError::FetchFailed(_))));

        cache.invalidate();
        assert_eq!(cache.settled().await, CacheStatus::Ready);
        assert!(!cache.get(Capability::CanCreateVendors));
        assert_eq!(cache.last_error(), None);
    }

    #[tokio::test]
    async fn failure_without_snapshot_is_fail_closed() {
        let source = FakeSource::open(vec![Err(FetchError::SchemaMismatch("sem objeto".into()))]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.init(session());

        assert_eq!(cache.settled().await, CacheStatus::Errored);
        assert!(!cache.get(Capability::CanCreateVendors));
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(0));
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn missing_token_fails_fast_without_request() {
        let source = FakeSource::open(vec![]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.init(Session::new("  ", Uuid::new_v4()));

        assert_eq!(cache.status(), CacheStatus::Errored);
        assert_eq!(cache.last_error(), Some(FetchError::AuthMissing));
        assert_eq!(source.calls(), 0);

        // Recarregar com o mesmo token vazio também não dispara requisição
        cache.invalidate();
        assert_eq!(cache.last_error(), Some(FetchError::AuthMissing));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn invalidate_without_session_stays_uninitialized() {
        let source = FakeSource::open(vec![Ok(vendors(true, 5))]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.invalidate();
        assert_eq!(cache.status(), CacheStatus::Uninitialized);

        cache.init(session());
        assert_eq!(cache.settled().await, CacheStatus::Ready);

        cache.teardown();
        cache.invalidate();

        assert_eq!(cache.status(), CacheStatus::Uninitialized);
        assert_eq!(cache.last_error(), None);
        assert!(!cache.get(Capability::CanCreateVendors));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn teardown_discards_in_flight_result() {
        let source = FakeSource::gated(vec![Ok(vendors(true, 5))]);
        let cache = PermissionCache::new(source.clone(), settings());

        cache.init(session());
        tokio::task::yield_now().await;
        cache.teardown();
        source.release();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.status(), CacheStatus::Uninitialized);
        assert!(!cache.get(Capability::CanCreateVendors));
    }

    // Uma resposta e um portão por token: o teste decide qual sessão responde primeiro.
    struct PerSessionSource {
        sessions: HashMap<String, (Semaphore, EffectivePermissions)>,
        finished: AtomicUsize,
    }

    impl PerSessionSource {
        fn new(sessions: Vec<(&str, EffectivePermissions)>) -> Arc<Self> {
            Arc::new(Self {
                sessions: sessions
                    .into_iter()
                    .map(|(token, permissions)| (token.to_string(), (Semaphore::new(0), permissions)))
                    .collect(),
                finished: AtomicUsize::new(0),
            })
        }

        fn release(&self, token: &str) {
            self.sessions[token].0.add_permits(1);
        }

        async fn wait_finished(&self, count: usize) {
            while self.finished.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    #[async_trait]
    impl PermissionSource for PerSessionSource {
        async fn fetch_effective_permissions(
            &self,
            session: &Session,
        ) -> Result<EffectivePermissions, FetchError> {
            let (gate, permissions) = &self.sessions[&session.token];
            gate.acquire().await.expect("gate fechado").forget();
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(permissions.clone())
        }
    }

    #[tokio::test]
    async fn new_session_ignores_previous_sessions_fetch() {
        let source = PerSessionSource::new(vec![
            ("sessao-antiga", vendors(true, 5)),
            ("sessao-nova", vendors(false, 1)),
        ]);
        let cache = PermissionCache::new(source.clone(), settings());
        let tenant_id = Uuid::new_v4();

        cache.init(Session::new("sessao-antiga", tenant_id));
        cache.init(Session::new("sessao-nova", tenant_id));

        // A sessão nova responde primeiro
        source.release("sessao-nova");
        assert_eq!(cache.settled().await, CacheStatus::Ready);
        assert!(!cache.get(Capability::CanCreateVendors));
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(1));

        // A resposta atrasada da sessão antiga chega e é descartada
        source.release("sessao-antiga");
        tokio::time::timeout(Duration::from_secs(1), source.wait_finished(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.status(), CacheStatus::Ready);
        assert!(!cache.get(Capability::CanCreateVendors));
        assert_eq!(cache.get_limit(Limit::MaxUsers), LimitValue::Limited(1));
    }

    #[tokio::test]
    async fn slow_fetch_times_out_after_retries() {
        let source = FakeSource::slow(Duration::from_millis(200));
        let cache = PermissionCache::new(
            source.clone(),
            CacheSettings {
                fetch_timeout: Duration::from_millis(20),
                max_retries: 1,
                retry_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(10),
            },
        );

        cache.init(session());

        assert_eq!(cache.settled().await, CacheStatus::Errored);
        assert_eq!(source.calls(), 2);
        assert!(matches!(cache.last_error(), Some(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let source = FakeSource::open(vec![
            Err(FetchError::FetchFailed("503".into())),
            Ok(vendors(true, 2)),
        ]);
        let cache = PermissionCache::new(
            source.clone(),
            CacheSettings {
                max_retries: 2,
                ..settings()
            },
        );

        cache.init(session());

        assert_eq!(cache.settled().await, CacheStatus::Ready);
        assert_eq!(source.calls(), 2);
        assert!(cache.get(Capability::CanCreateVendors));
    }

    #[tokio::test]
    async fn schema_mismatch_is_not_retried() {
        let source = FakeSource::open(vec![
            Err(FetchError::SchemaMismatch("campo errado".into())),
            Ok(vendors(true, 2)),
        ]);
        let cache = PermissionCache::new(
            source.clone(),
            CacheSettings {
                max_retries: 3,
                ..settings()
            },
        );

        cache.init(session());

        assert_eq!(cache.settled().await, CacheStatus::Errored);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_status_changes() {
        let source = FakeSource::gated(vec![Ok(vendors(true, 5))]);
        let cache = PermissionCache::new(source.clone(), settings());
        let mut rx = cache.subscribe();

        cache.init(session());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CacheStatus::Loading);

        source.release();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), CacheStatus::Ready);
    }
}
