//! Registry of live automation sessions
//!
//! Sessions are keyed by their id and guarded by a per-session
//! `tokio::sync::Mutex`, so calls against one session run one at a time in
//! arrival order while different sessions proceed independently. Areas are
//! keyed separately and always resolve through their owning session.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::config::ModelSpec;
use crate::driver::{DriverFactory, Platform};
use crate::interpreter::{AreaScope, InterpreterFactory};
use crate::session::{Area, DriverSession, SessionInfo};
use crate::{Error, Result};

type SessionHandle = Arc<Mutex<DriverSession>>;

struct Entry {
    info: SessionInfo,
    handle: SessionHandle,
}

/// Session registry owned by one dispatcher instance
pub struct SessionStore {
    drivers: Arc<dyn DriverFactory>,
    interpreters: Arc<dyn InterpreterFactory>,
    model: ModelSpec,
    sessions: RwLock<HashMap<String, Entry>>,
    areas: RwLock<HashMap<String, Area>>,
}

impl SessionStore {
    pub fn new(
        drivers: Arc<dyn DriverFactory>,
        interpreters: Arc<dyn InterpreterFactory>,
        model: ModelSpec,
    ) -> Self {
        Self {
            drivers,
            interpreters,
            model,
            sessions: RwLock::new(HashMap::new()),
            areas: RwLock::new(HashMap::new()),
        }
    }

    /// Model every new session's interpreter is created for
    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Create a session: interpreter first, then the driver, then navigation.
    ///
    /// Nothing is registered unless every step succeeds. A driver whose
    /// navigation fails is quit before the error is returned.
    pub async fn start(&self, platform: Platform, url: Option<&str>) -> Result<SessionInfo> {
        let interpreter = self.interpreters.create(&self.model)?;
        let driver = self.drivers.launch(platform, url).await?;

        if let (Platform::Chromium, Some(url)) = (platform, url) {
            if let Err(e) = driver.navigate(url).await {
                warn!(platform = %platform, url, error = %e, "Navigation failed, closing driver");
                if let Err(quit_err) = driver.quit().await {
                    warn!(error = %quit_err, "Failed to close driver after navigation error");
                }
                return Err(e);
            }
        }

        let session = DriverSession::new(
            platform,
            self.model.id(),
            url.map(str::to_string),
            driver,
            interpreter,
        );
        let info = session.info();

        self.sessions
            .write()
            .await
            .insert(
                info.id.clone(),
                Entry {
                    info: info.clone(),
                    handle: Arc::new(Mutex::new(session)),
                },
            );

        info!(driver_id = %info.id, platform = %platform, model = %info.model, "Driver started");
        Ok(info)
    }

    /// Wait for exclusive access to a session
    async fn lock(&self, id: &str) -> Result<OwnedMutexGuard<DriverSession>> {
        let handle = self.handle(id).await?;
        Self::acquire(id, handle).await
    }

    async fn handle(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    async fn acquire(id: &str, handle: SessionHandle) -> Result<OwnedMutexGuard<DriverSession>> {
        let guard = handle.lock_owned().await;
        if guard.closed {
            // quit won the race while this call was queued
            return Err(Error::SessionNotFound(id.to_string()));
        }
        Ok(guard)
    }

    /// Run `f` with exclusive access to the session
    pub async fn with_session<R, F>(&self, id: &str, f: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a mut DriverSession) -> BoxFuture<'a, Result<R>> + Send,
        R: Send,
    {
        let mut guard = self.lock(id).await?;
        f(&mut *guard).await
    }

    /// Locate a region of the session's current view and register it
    pub async fn create_area(&self, session_id: &str, description: &str) -> Result<Area> {
        let session = self.lock(session_id).await?;
        let scope = session
            .interpreter
            .locate_area(session.driver.as_ref(), description)
            .await?;

        let area = Area::new(session_id, scope);
        // registered while the session is still locked so a concurrent quit
        // cannot miss it
        self.areas
            .write()
            .await
            .insert(area.id.clone(), area.clone());

        debug!(driver_id = session_id, area_id = %area.id, root = area.scope.root, "Area created");
        Ok(area)
    }

    /// Run `f` against the area's owning session, passing the area scope
    pub async fn with_area<R, F>(&self, area_id: &str, f: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a mut DriverSession, AreaScope) -> BoxFuture<'a, Result<R>> + Send,
        R: Send,
    {
        let area = self
            .areas
            .read()
            .await
            .get(area_id)
            .cloned()
            .ok_or_else(|| Error::AreaNotFound(area_id.to_string()))?;

        let mut session = self.lock(&area.session_id).await.map_err(|e| match e {
            Error::SessionNotFound(_) => Error::AreaNotFound(area_id.to_string()),
            other => other,
        })?;
        f(&mut *session, area.scope).await
    }

    /// Remove a session and its areas, then close its interpreter and driver.
    ///
    /// Calls already queued on the session finish first; calls queued behind
    /// the quit fail with `session_not_found`. An interpreter that fails to
    /// close is logged and the driver is still quit.
    pub async fn quit(&self, id: &str) -> Result<()> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        let mut session = entry.handle.lock_owned().await;
        session.closed = true;

        let removed = {
            let mut areas = self.areas.write().await;
            let before = areas.len();
            areas.retain(|_, area| area.session_id != id);
            before - areas.len()
        };

        if let Err(e) = session.interpreter.close().await {
            warn!(driver_id = id, error = %e, "Failed to close interpreter");
        }

        let result = session.driver.quit().await;
        info!(driver_id = id, areas = removed, "Driver closed");
        result
    }

    /// Close every remaining session
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }

        info!(count = ids.len(), "Closing remaining drivers");
        for id in ids {
            if let Err(e) = self.quit(&id).await {
                warn!(driver_id = %id, error = %e, "Failed to close driver during shutdown");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn area_count(&self) -> usize {
        self.areas.read().await.len()
    }

    /// Describe all sessions, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriverFactory, FakeInterpreterFactory};
    use std::time::Duration;

    fn store_with(drivers: FakeDriverFactory, interpreters: FakeInterpreterFactory) -> SessionStore {
        SessionStore::new(
            Arc::new(drivers),
            Arc::new(interpreters),
            ModelSpec::default(),
        )
    }

    fn store() -> (SessionStore, FakeDriverFactory) {
        let drivers = FakeDriverFactory::new();
        (store_with(drivers.clone(), FakeInterpreterFactory::new()), drivers)
    }

    #[tokio::test]
    async fn test_start_registers_session() {
        let (store, drivers) = store();

        let info = store
            .start(Platform::Chromium, Some("https://example.com"))
            .await
            .unwrap();

        assert_eq!(info.platform, Platform::Chromium);
        assert_eq!(info.model, ModelSpec::default().id());
        assert_eq!(store.len().await, 1);
        assert_eq!(drivers.launched()[0].navigations(), vec!["https://example.com"]);
    }

    #[tokio::test]
    async fn test_start_without_url_does_not_navigate() {
        let (store, drivers) = store();
        store.start(Platform::Chromium, None).await.unwrap();
        assert!(drivers.launched()[0].navigations().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_launches_nothing() {
        let drivers = FakeDriverFactory::new();
        let store = store_with(drivers.clone(), FakeInterpreterFactory::failing_auth());

        let err = store.start(Platform::Chromium, None).await.unwrap_err();
        assert_eq!(err.category(), "authentication");
        assert!(drivers.launched().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_navigation_failure_quits_driver() {
        let drivers = FakeDriverFactory::failing_navigation();
        let store = store_with(drivers.clone(), FakeInterpreterFactory::new());

        let err = store
            .start(Platform::Chromium, Some("https://nowhere.invalid"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "driver");
        assert!(drivers.launched()[0].is_quit());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_with_session_unknown_id() {
        let (store, _) = store();
        let err = store
            .with_session("missing", |_| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "session_not_found");
    }

    #[tokio::test]
    async fn test_quit_invalidates_session_and_areas() {
        let (store, drivers) = store();
        let info = store.start(Platform::Chromium, None).await.unwrap();
        let area = store.create_area(&info.id, "main menu").await.unwrap();
        assert_eq!(area.scope.root, 5);
        assert_eq!(store.area_count().await, 1);

        store.quit(&info.id).await.unwrap();

        assert!(drivers.launched()[0].is_quit());
        assert_eq!(store.area_count().await, 0);

        let err = store
            .with_session(&info.id, |_| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "session_not_found");

        let err = store
            .with_area(&area.id, |_, _| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "area_not_found");

        let err = store.quit(&info.id).await.unwrap_err();
        assert_eq!(err.category(), "session_not_found");
    }

    #[tokio::test]
    async fn test_calls_racing_quit_fail_cleanly() {
        let drivers = FakeDriverFactory::new();
        let interpreters = Arc::new(FakeInterpreterFactory::new());
        let store = Arc::new(SessionStore::new(
            Arc::new(drivers.clone()),
            interpreters.clone(),
            ModelSpec::default(),
        ));
        let info = store.start(Platform::Chromium, None).await.unwrap();
        let area = store.create_area(&info.id, "main menu").await.unwrap();

        // hold the session until told to let go
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = tokio::spawn({
            let store = store.clone();
            let id = info.id.clone();
            async move {
                store
                    .with_session(&id, move |_| {
                        Box::pin(async move {
                            entered_tx.send(()).ok();
                            release_rx.await.ok();
                            Ok(())
                        })
                    })
                    .await
            }
        });
        entered_rx.await.unwrap();
        let handle = store.handle(&info.id).await.unwrap();

        let quit = tokio::spawn({
            let store = store.clone();
            let id = info.id.clone();
            async move { store.quit(&id).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // quit has unregistered the session but is still waiting for the lock
        assert!(store.is_empty().await);
        assert_eq!(store.area_count().await, 1);

        let err = store
            .with_session(&info.id, |_| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "session_not_found");

        let err = store
            .with_area(&area.id, |_, _| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "area_not_found");

        // a caller that looked the session up before quit queues behind it
        let queued = tokio::spawn({
            let id = info.id.clone();
            async move { SessionStore::acquire(&id, handle).await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        quit.await.unwrap().unwrap();

        let err = queued.await.unwrap().unwrap_err();
        assert_eq!(err.category(), "session_not_found");
        assert_eq!(store.area_count().await, 0);
        assert_eq!(interpreters.closed(), 1);
        assert_eq!(drivers.launched()[0].quit_count(), 1);
    }

    #[tokio::test]
    async fn test_with_area_passes_scope() {
        let (store, _) = store();
        let info = store.start(Platform::Chromium, None).await.unwrap();
        let area = store.create_area(&info.id, "main menu").await.unwrap();

        let outcome = store
            .with_area(&area.id, |session, scope| {
                Box::pin(async move {
                    session
                        .interpreter
                        .act(session.driver.as_ref(), "open home", Some(&scope))
                        .await
                })
            })
            .await
            .unwrap();
        assert_eq!(outcome.steps[0].target(), Some(6));
    }

    #[tokio::test]
    async fn test_operations_on_one_session_are_serialised() {
        let (store, _) = store();
        let store = Arc::new(store);
        let info = store.start(Platform::Chromium, None).await.unwrap();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for n in 0..3u64 {
            let store = store.clone();
            let order = order.clone();
            let id = info.id.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .with_session(&id, move |_| {
                        Box::pin(async move {
                            order.lock().unwrap().push(format!("start {}", n));
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            order.lock().unwrap().push(format!("end {}", n));
                            Ok(())
                        })
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let order = order.lock().unwrap().clone();
        assert_eq!(
            order,
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (store, drivers) = store();
        let a = store.start(Platform::Chromium, None).await.unwrap();
        let b = store.start(Platform::Ios, None).await.unwrap();
        assert_ne!(a.id, b.id);

        store.quit(&a.id).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(!drivers.launched()[1].is_quit());
        assert_eq!(store.list().await[0].id, b.id);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let drivers = FakeDriverFactory::new();
        let interpreters = Arc::new(FakeInterpreterFactory::new());
        let store = SessionStore::new(
            Arc::new(drivers.clone()),
            interpreters.clone(),
            ModelSpec::default(),
        );
        store.start(Platform::Chromium, None).await.unwrap();
        store.start(Platform::Chromium, None).await.unwrap();

        store.shutdown().await;

        assert!(store.is_empty().await);
        assert_eq!(interpreters.closed(), 2);
        assert!(drivers.launched().iter().all(|d| d.quit_count() == 1));
    }
}
