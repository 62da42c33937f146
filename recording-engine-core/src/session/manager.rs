use std::sync::Arc;

use parking_lot::Mutex;

use crate::encoder::resources::EncoderResources;
use crate::models::device::DeviceInfo;
use crate::models::error::RecorderError;
use crate::models::state::SessionState;
use crate::session::recorder::RecordingSession;
use crate::traits::device_provider::DeviceProvider;

/// Owns any number of independent recording sessions.
///
/// Sessions share the device provider (read-only enumeration and backend
/// factories) and the encoder resources; nothing else crosses between them.
pub struct SessionManager {
    devices: Arc<dyn DeviceProvider>,
    resources: Arc<EncoderResources>,
    sessions: Mutex<Vec<RecordingSession>>,
}

impl SessionManager {
    /// Manager with software-only encoding.
    pub fn new(devices: Arc<dyn DeviceProvider>) -> Self {
        Self::with_resources(devices, EncoderResources::software_only())
    }

    pub fn with_resources(devices: Arc<dyn DeviceProvider>, resources: EncoderResources) -> Self {
        Self {
            devices,
            resources: Arc::new(resources),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn create_session(&self) -> RecordingSession {
        let session = RecordingSession::new(Arc::clone(&self.devices), Arc::clone(&self.resources));
        log::info!("session {} created", session.id());
        self.sessions.lock().push(session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<RecordingSession> {
        self.sessions.lock().iter().find(|s| s.id() == id).cloned()
    }

    /// Forget an idle session.
    pub fn remove(&self, id: &str) -> Result<RecordingSession, RecorderError> {
        let mut sessions = self.sessions.lock();
        let index = sessions
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| RecorderError::Configuration(format!("unknown session {}", id)))?;
        let state = sessions[index].status();
        if !state.is_idle() {
            return Err(RecorderError::InvalidState(format!(
                "session {} is {} and cannot be removed",
                id, state
            )));
        }
        log::info!("session {} removed", id);
        Ok(sessions.remove(index))
    }

    /// Ids and states in creation order.
    pub fn list(&self) -> Vec<(String, SessionState)> {
        self.sessions
            .lock()
            .iter()
            .map(|s| (s.id().to_string(), s.status()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Request teardown of every active session.
    pub fn stop_all(&self) {
        let sessions: Vec<RecordingSession> = self.sessions.lock().clone();
        for session in sessions {
            if let Err(e) = session.stop() {
                log::warn!("failed to stop session {}: {}", session.id(), e);
            }
        }
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.devices()
    }

    pub fn resources(&self) -> &Arc<EncoderResources> {
        &self.resources
    }
}
