use std::collections::VecDeque;
use std::sync::RwLock;

/// Tokens kept valid at once. Older ones are forgotten first.
pub const MAX_LIVE_TOKENS: usize = 64;

/// Bounded set of issued access tokens
pub struct TokenStore {
    capacity: usize,
    live: RwLock<VecDeque<String>>,
}

impl TokenStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            live: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Mints a token, evicting the oldest one when full.
    pub fn issue(&self) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        if let Ok(mut live) = self.live.write() {
            while live.len() >= self.capacity {
                live.pop_front();
            }
            live.push_back(token.clone());
        }
        token
    }

    pub fn is_valid(&self, token: &str) -> bool {
        !token.is_empty()
            && self
                .live
                .read()
                .map(|live| live.iter().any(|t| t == token))
                .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.live.read().map(|live| live.len()).unwrap_or(0)
    }
}
