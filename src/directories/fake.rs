//! Scripted in-memory directory used by the orchestrator tests.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::directories::directory::{
    ActionParams, Directory, LookupRequest, MutationAction, MutationRequest,
};
use crate::model::DirectoryAccount;

pub(crate) fn account(sam: &str, name: &str) -> DirectoryAccount {
    DirectoryAccount {
        display_name: name.to_string(),
        sam_account_name: sam.to_string(),
        user_principal_name: Some(format!("{}@corp.example", sam)),
        distinguished_name: Some(format!("CN={},OU=Staff,DC=corp,DC=example", name)),
        enabled: true,
        locked: false,
        custom_fields: BTreeMap::new(),
    }
}

#[derive(Default)]
pub(crate) struct FakeDirectory {
    lookups: HashMap<String, Result<Vec<DirectoryAccount>, String>>,
    mutation_errors: HashMap<String, String>,
    mutation_panics: Vec<String>,
    delays: HashMap<String, Duration>,
    lookup_calls: AtomicUsize,
    mutate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    mutations: Mutex<Vec<(String, MutationAction, Option<bool>)>>,
}

impl FakeDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_accounts(mut self, term: &str, accounts: Vec<DirectoryAccount>) -> Self {
        self.lookups.insert(term.to_string(), Ok(accounts));
        self
    }

    pub(crate) fn with_lookup_error(mut self, term: &str, error: &str) -> Self {
        self.lookups.insert(term.to_string(), Err(error.to_string()));
        self
    }

    pub(crate) fn with_mutation_error(mut self, target: &str, error: &str) -> Self {
        self.mutation_errors
            .insert(target.to_string(), error.to_string());
        self
    }

    pub(crate) fn with_mutation_panic(mut self, target: &str) -> Self {
        self.mutation_panics.push(target.to_string());
        self
    }

    /// Delay the invocation for a lookup term or mutation target
    pub(crate) fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mutate_calls(&self) -> usize {
        self.mutate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// (target, action, change-at-logon flag) for every mutation received
    pub(crate) fn mutations(&self) -> Vec<(String, MutationAction, Option<bool>)> {
        self.mutations.lock().unwrap().clone()
    }

    async fn enter(&self, key: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        match self.delays.get(key) {
            Some(delay) => tokio::time::sleep(*delay).await,
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Directory for FakeDirectory {
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<DirectoryAccount>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let term = request.filter.pattern.trim_matches('*').to_string();
        self.enter(&term).await;

        match self.lookups.get(&term) {
            Some(Ok(accounts)) => Ok(accounts.clone()),
            Some(Err(error)) => anyhow::bail!("{}", error),
            None => Ok(Vec::new()),
        }
    }

    async fn mutate(&self, request: &MutationRequest) -> Result<()> {
        self.mutate_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(&request.target).await;
        if self.mutation_panics.contains(&request.target) {
            panic!("directory client crashed on {}", request.target);
        }

        let flag = match &request.params {
            ActionParams::ResetPassword { temporary, .. } => Some(*temporary),
            _ => None,
        };
        self.mutations
            .lock()
            .unwrap()
            .push((request.target.clone(), request.params.action(), flag));

        match self.mutation_errors.get(&request.target) {
            Some(error) => anyhow::bail!("{}", error),
            None => Ok(()),
        }
    }

    fn directory_type(&self) -> &'static str {
        "fake"
    }
}
