use std::sync::Arc;

use crate::service::{ClientService, EmailSender, FitnessCategoryService};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub clients: Arc<ClientService>,
    pub categories: Arc<FitnessCategoryService>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn EmailSender>, page_size: usize) -> Self {
        Self {
            clients: Arc::new(ClientService::new(store.clone(), mailer).with_default_page_size(page_size)),
            categories: Arc::new(FitnessCategoryService::new(store)),
        }
    }
}
