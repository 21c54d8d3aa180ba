//! Caches which secondary server a sensor has been activated on, and
//! implements the deliberately asymmetric activation rules the control
//! plane follows:
//!
//! * [`TokenDirectory::get_token`] activates a sensor on a server the first
//!   time it is asked about, caching both the token and the owning server.
//! * [`TokenDirectory::enable_for_ros`] activates the sensor (via
//!   `get_token`) if it has not been activated yet, then enables ROS on
//!   whichever server now owns it.
//! * [`TokenDirectory::disable_for_ros`] does **not** activate a sensor that
//!   has never been asked about — disabling something that was never
//!   turned on is a no-op, not an implicit activation.
//! * [`TokenDirectory::is_enabled_for_ros`] returns `false`, rather than
//!   erroring, for a sensor that has no server at all.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use slog::{info, Logger};

use crate::streaming::token::Token;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies the round-robin dispatch and per-server RPCs the directory
/// needs, without the directory needing to know how sessions, the
/// correlator, or round-robin selection are implemented.
pub trait SecondaryDispatch: Send + Sync {
    /// Picks the next server in round-robin order, advancing the cursor,
    /// and asks it to activate `sensor_id`. Returns the id of the server
    /// that ended up owning the sensor along with its token, so the
    /// directory can cache both without a separate peek that could race
    /// against this call under concurrent activations.
    fn dispatch_get_token<'a>(&'a self, sensor_id: u32) -> BoxFuture<'a, std::io::Result<(u32, Token)>>;
    fn send_set_ros<'a>(&'a self, server_id: u32, sensor_id: u32, enable: bool) -> BoxFuture<'a, std::io::Result<bool>>;
    fn send_is_ros_enabled<'a>(&'a self, server_id: u32, sensor_id: u32) -> BoxFuture<'a, std::io::Result<bool>>;
}

pub struct TokenDirectory {
    tokens: Mutex<HashMap<u32, Token>>,
    servers: Mutex<HashMap<u32, u32>>,
    log: Logger,
}

impl TokenDirectory {
    pub fn new(log: Logger) -> TokenDirectory {
        TokenDirectory {
            tokens: Mutex::new(HashMap::new()),
            servers: Mutex::new(HashMap::new()),
            log,
        }
    }

    fn server_for(&self, sensor_id: u32) -> Option<u32> {
        self.servers.lock().unwrap().get(&sensor_id).copied()
    }

    /// Returns the token for `sensor_id`, activating it on a freshly chosen
    /// server the first time it is asked about. Subsequent calls return the
    /// cached token without contacting any server again.
    pub async fn get_token(
        &self,
        dispatch: &dyn SecondaryDispatch,
        sensor_id: u32,
    ) -> std::io::Result<Token> {
        if let Some(token) = self.tokens.lock().unwrap().get(&sensor_id).copied() {
            info!(self.log, "using token from already activated sensor"; "sensor_id" => sensor_id);
            return Ok(token);
        }

        let (server_id, token) = dispatch.dispatch_get_token(sensor_id).await?;

        self.tokens.lock().unwrap().insert(sensor_id, token);
        self.servers.lock().unwrap().insert(sensor_id, server_id);
        info!(self.log, "using token from newly activated sensor"; "sensor_id" => sensor_id, "server_id" => server_id);
        Ok(token)
    }

    /// Enables ROS bridging for `sensor_id`, activating it first if it has
    /// not been seen before.
    pub async fn enable_for_ros(
        &self,
        dispatch: &dyn SecondaryDispatch,
        sensor_id: u32,
    ) -> std::io::Result<()> {
        if let Some(server_id) = self.server_for(sensor_id) {
            dispatch.send_set_ros(server_id, sensor_id, true).await?;
            return Ok(());
        }
        self.get_token(dispatch, sensor_id).await?;
        let server_id = self.server_for(sensor_id).expect("get_token just populated this");
        dispatch.send_set_ros(server_id, sensor_id, true).await?;
        Ok(())
    }

    /// Disables ROS bridging for `sensor_id`. Unlike `enable_for_ros`, a
    /// sensor that was never activated is left alone rather than being
    /// activated just to disable it.
    pub async fn disable_for_ros(
        &self,
        dispatch: &dyn SecondaryDispatch,
        sensor_id: u32,
    ) -> std::io::Result<()> {
        if let Some(server_id) = self.server_for(sensor_id) {
            dispatch.send_set_ros(server_id, sensor_id, false).await?;
        } else {
            info!(self.log, "disable_for_ros on sensor with no active server, ignoring"; "sensor_id" => sensor_id);
        }
        Ok(())
    }

    /// Reports whether ROS bridging is enabled for `sensor_id`. Returns
    /// `false`, not an error, if the sensor has never been activated on any
    /// server.
    pub async fn is_enabled_for_ros(
        &self,
        dispatch: &dyn SecondaryDispatch,
        sensor_id: u32,
    ) -> std::io::Result<bool> {
        match self.server_for(sensor_id) {
            Some(server_id) => dispatch.send_is_ros_enabled(server_id, sensor_id).await,
            None => Ok(false),
        }
    }

    /// Drops cached tokens and server assignments for a server that just
    /// disconnected, so the next request for any sensor it was serving
    /// re-activates on a still-live server instead of replaying a stale
    /// token.
    pub fn invalidate_server(&self, server_id: u32) {
        self.servers.lock().unwrap().retain(|_, v| *v != server_id);
        let mut tokens = self.tokens.lock().unwrap();
        let servers = self.servers.lock().unwrap();
        tokens.retain(|sensor_id, _| servers.contains_key(sensor_id));
    }
}
