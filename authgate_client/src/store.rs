use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use authgate_clock::{Clock, DurationSecs, System, UnixTime};
use authgate_jose::jwt::{ClientId, ClientIdRef, Realm, RealmRef};

use crate::{dto::TokenResponse, AccessToken, AccessTokenRef};

/// An access token with the times it was issued and expires
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredToken {
    access_token: AccessToken,
    token_type: String,
    issued: UnixTime,
    expiry: UnixTime,
}

impl StoredToken {
    /// Records `access_token`, issued at `issued` and valid for `lifetime`
    #[must_use]
    pub fn new(access_token: AccessToken, issued: UnixTime, lifetime: DurationSecs) -> Self {
        Self {
            access_token,
            token_type: "Bearer".into(),
            issued,
            expiry: issued + lifetime,
        }
    }

    fn from_response(response: TokenResponse, issued: UnixTime) -> Self {
        Self {
            token_type: response.token_type,
            ..Self::new(response.access_token, issued, response.expires_in)
        }
    }

    /// The access token
    #[inline]
    #[must_use]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The token type reported by the server
    #[inline]
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// When the token was stored
    #[inline]
    #[must_use]
    pub fn issued(&self) -> UnixTime {
        self.issued
    }

    /// When the token expires
    #[inline]
    #[must_use]
    pub fn expiry(&self) -> UnixTime {
        self.expiry
    }

    /// Whether the token still has more than `min_validity` left at `now`
    #[inline]
    #[must_use]
    pub fn is_usable_at(&self, now: UnixTime, min_validity: DurationSecs) -> bool {
        now + min_validity < self.expiry
    }
}

/// Access tokens this service holds, per client and realm
///
/// A token within the minimum-validity margin of its expiry counts as
/// absent, so callers never hand out a token about to lapse in flight.
#[derive(Debug)]
pub struct TokenStore<C = System> {
    tokens: RwLock<HashMap<Realm, HashMap<ClientId, StoredToken>>>,
    min_validity: DurationSecs,
    clock: C,
}

impl TokenStore {
    /// An empty store reading the system clock
    #[must_use]
    pub fn new(min_validity: DurationSecs) -> Self {
        Self::with_clock(min_validity, System)
    }
}

impl<C: Clock> TokenStore<C> {
    /// An empty store reading `clock`
    #[must_use]
    pub fn with_clock(min_validity: DurationSecs, clock: C) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            min_validity,
            clock,
        }
    }

    /// The margin before expiry inside which tokens count as absent
    #[must_use]
    pub fn min_validity(&self) -> DurationSecs {
        self.min_validity
    }

    /// The usable token for `client_id` in `realm`, if any
    #[must_use]
    pub fn get(&self, client_id: &ClientIdRef, realm: &RealmRef) -> Option<StoredToken> {
        let now = self.clock.now();
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);

        tokens
            .get(realm)
            .and_then(|clients| clients.get(client_id))
            .filter(|token| token.is_usable_at(now, self.min_validity))
            .cloned()
    }

    /// Stores `token`, replacing any previous one for the same client and realm
    pub fn insert(&self, client_id: ClientId, realm: Realm, token: StoredToken) {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        tokens.entry(realm).or_default().insert(client_id, token);
    }

    /// Stores a fresh token endpoint response, timestamped now
    pub fn insert_response(
        &self,
        client_id: ClientId,
        realm: Realm,
        response: TokenResponse,
    ) -> StoredToken {
        let token = StoredToken::from_response(response, self.clock.now());
        self.insert(client_id, realm, token.clone());
        token
    }

    /// Forgets the token for `client_id` in `realm`
    pub fn remove(&self, client_id: &ClientIdRef, realm: &RealmRef) -> Option<StoredToken> {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let clients = tokens.get_mut(realm)?;
        let removed = clients.remove(client_id);
        if clients.is_empty() {
            tokens.remove(realm);
        }
        removed
    }

    /// Drops tokens that are no longer usable
    ///
    /// Returns the number of tokens dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);

        let mut purged = 0;
        tokens.retain(|_, clients| {
            let before = clients.len();
            clients.retain(|_, token| token.is_usable_at(now, self.min_validity));
            purged += before - clients.len();
            !clients.is_empty()
        });

        if purged > 0 {
            tracing::debug!(purged, "purged expired access tokens");
        }

        purged
    }

    /// Drops every token
    pub fn clear(&self) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of usable tokens
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        tokens
            .values()
            .flat_map(HashMap::values)
            .filter(|token| token.is_usable_at(now, self.min_validity))
            .count()
    }

    /// Whether no usable token is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use authgate_clock::TestClock;

    use super::*;

    const NOW: UnixTime = UnixTime(1_700_000_000);

    fn store() -> (TestClock, TokenStore<TestClock>) {
        let clock = TestClock::new(NOW);
        (clock.clone(), TokenStore::with_clock(DurationSecs(30), clock))
    }

    fn token(value: &'static str, lifetime: u64) -> StoredToken {
        StoredToken::new(AccessToken::from_static(value), NOW, DurationSecs(lifetime))
    }

    #[test]
    fn tokens_are_keyed_by_client_and_realm() {
        let (_, store) = store();
        store.insert("orders".into(), "main".into(), token("a", 300));
        store.insert("orders".into(), "other".into(), token("b", 300));
        store.insert("billing".into(), "main".into(), token("c", 300));

        let get = |client: &str, realm: &str| {
            store
                .get(ClientIdRef::from_str(client), RealmRef::from_str(realm))
                .map(|t| t.access_token().as_str().to_owned())
        };

        assert_eq!(get("orders", "main").as_deref(), Some("a"));
        assert_eq!(get("orders", "other").as_deref(), Some("b"));
        assert_eq!(get("billing", "main").as_deref(), Some("c"));
        assert_eq!(get("billing", "other"), None);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn tokens_inside_the_margin_count_as_absent() {
        let (clock, store) = store();
        store.insert("orders".into(), "main".into(), token("a", 300));

        let client = ClientIdRef::from_static("orders");
        let realm = RealmRef::from_static("main");

        clock.set(NOW + DurationSecs(269));
        assert!(store.get(client, realm).is_some());

        clock.set(NOW + DurationSecs(270));
        assert!(store.get(client, realm).is_none());
        assert!(store.is_empty());

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn replacing_and_removing() {
        let (_, store) = store();
        let client = ClientIdRef::from_static("orders");
        let realm = RealmRef::from_static("main");

        store.insert(client.to_owned(), realm.to_owned(), token("a", 300));
        store.insert(client.to_owned(), realm.to_owned(), token("b", 600));
        assert_eq!(
            store.get(client, realm).map(|t| t.expiry()),
            Some(NOW + DurationSecs(600))
        );

        assert!(store.remove(client, realm).is_some());
        assert!(store.remove(client, realm).is_none());

        store.insert(client.to_owned(), realm.to_owned(), token("c", 300));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn response_is_timestamped_by_the_store_clock() {
        let (clock, store) = store();
        clock.inc(10);

        let response = TokenResponse {
            access_token: AccessToken::from_static("fresh"),
            token_type: "Bearer".into(),
            expires_in: DurationSecs(120),
            scope: None,
        };
        let stored = store.insert_response("orders".into(), "main".into(), response);

        assert_eq!(stored.issued(), NOW + DurationSecs(10));
        assert_eq!(stored.expiry(), NOW + DurationSecs(130));
        assert_eq!(stored.token_type(), "Bearer");
    }
}
