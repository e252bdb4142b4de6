use crate::transport::Transport;
use std::collections::BTreeMap;
use tilemud_common::{MessageMode, PlayerId};

/// One connected participant.
///
/// `K` is the continuation type: the state that decides what the next input
/// line means while a request is outstanding.
pub struct Player<K> {
    id: PlayerId,
    transport: Option<Box<dyn Transport>>,
    mode: Option<MessageMode>,
    pending: Option<K>,
}

impl<K> std::fmt::Debug for Player<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("connected", &self.transport.is_some())
            .field("mode", &self.mode)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

impl<K> std::fmt::Display for Player<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(transport) = &self.transport {
            write!(f, "{{{}}}", transport.peer())?;
        }
        Ok(())
    }
}

impl<K> Player<K> {
    pub fn new(id: PlayerId, transport: Box<dyn Transport>) -> Self {
        Self {
            id,
            transport: Some(transport),
            mode: None,
            pending: None,
        }
    }

    /// Connection-scoped id, never reused within one run.
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Mode of the block currently open, `None` at the start of an input.
    pub fn mode(&self) -> Option<MessageMode> {
        self.mode
    }

    /// The continuation waiting for the next input line, if any.
    pub fn pending(&self) -> Option<&K> {
        self.pending.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Write raw text with no terminator and no mode bookkeeping.
    pub fn send(&mut self, text: &str) {
        if let Some(transport) = &mut self.transport {
            transport.send(text);
        }
    }

    /// Write one line in `mode`, opening a new block on a mode change.
    pub fn send_line(&mut self, text: &str, mode: MessageMode) {
        let Some(transport) = &mut self.transport else {
            return;
        };
        if self.mode.is_some_and(|current| current != mode) {
            transport.send("\r\n");
        }
        self.mode = Some(mode);
        transport.send_line(text);
    }

    /// Ask a question and route the next input line to `continuation`.
    ///
    /// The prompt is followed by a single space and no line terminator. A
    /// new request replaces any continuation still pending.
    pub fn request(&mut self, prompt: &str, continuation: K) {
        if !prompt.is_empty() {
            self.send(prompt);
            self.send(" ");
        }
        self.pending = Some(continuation);
    }

    /// Start processing one input line.
    ///
    /// Resets the output mode and takes the pending continuation, leaving
    /// none registered. `None` means the line is a command.
    pub fn begin_input(&mut self) -> Option<K> {
        self.mode = None;
        self.pending.take()
    }

    /// Drop the transport, closing the connection.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.pending = None;
    }
}

/// Registry of live players in connection order.
pub struct Players<K> {
    players: BTreeMap<PlayerId, Player<K>>,
    next_id: u64,
}

impl<K> Default for Players<K> {
    fn default() -> Self {
        Self {
            players: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<K> std::fmt::Debug for Players<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.players.values()).finish()
    }
}

impl<K> Players<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a fresh session id.
    pub fn connect(&mut self, transport: Box<dyn Transport>) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;
        self.players.insert(id, Player::new(id, transport));
        id
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player<K>> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player<K>> {
        self.players.get_mut(&id)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player<K>> {
        self.players.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.keys().copied()
    }

    /// Send a line to `id` if it is still connected.
    pub fn send_line(&mut self, id: PlayerId, text: &str, mode: MessageMode) {
        if let Some(player) = self.players.get_mut(&id) {
            player.send_line(text, mode);
        }
    }

    /// Send a line to every player except `except`.
    pub fn broadcast(&mut self, text: &str, mode: MessageMode, except: Option<PlayerId>) {
        for (id, player) in &mut self.players {
            if Some(*id) != except {
                player.send_line(text, mode);
            }
        }
    }
}
