//! Customer roster screen: list, filter, create, edit, delete, detail view.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::{matches_query, Busy, BusyFlags, Editor};
use crate::backend::{CREATED, NO_CONTENT, OK};
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::identity::Capabilities;
use crate::model::{Customer, CustomerForm, CustomerId, CustomerPayload};
use crate::notify::Notice;
use crate::validate::validate_customer;

/// Customers whose name contains `query`, ignoring case. Order is preserved.
pub fn filter_customers<'a>(customers: &'a [Customer], query: &str) -> Vec<&'a Customer> {
    customers.iter().filter(|c| matches_query(&c.name, query)).collect()
}

fn denied(action: &str) -> AppError {
    AppError::forbidden("insufficient_role", format!("You do not have permission to {action}."))
}

pub struct CustomerDirectory {
    ctx: AppContext,
    caps: Capabilities,
    customers: Vec<Customer>,
    search: String,
    loading: bool,
    busy: BusyFlags,
    editor: Editor<Customer>,
    pending_delete: Option<Customer>,
    today: Option<NaiveDate>,
}

impl CustomerDirectory {
    pub fn new(ctx: AppContext, caps: Capabilities) -> Self {
        Self {
            ctx,
            caps,
            customers: Vec::new(),
            search: String::new(),
            loading: false,
            busy: BusyFlags::default(),
            editor: Editor::Closed,
            pending_delete: None,
            today: None,
        }
    }

    /// Pin the date used to reject future payment dates.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn customers(&self) -> &[Customer] { &self.customers }
    pub fn capabilities(&self) -> Capabilities { self.caps }
    pub fn is_loading(&self) -> bool { self.loading }
    pub fn busy(&self) -> BusyFlags { self.busy }
    pub fn editor(&self) -> &Editor<Customer> { &self.editor }
    pub fn pending_delete(&self) -> Option<&Customer> { self.pending_delete.as_ref() }
    pub fn search(&self) -> &str { &self.search }

    pub fn set_search(&mut self, query: impl Into<String>) { self.search = query.into(); }

    /// Current list narrowed by the search text.
    pub fn filtered(&self) -> Vec<&Customer> { filter_customers(&self.customers, &self.search) }

    pub fn find(&self, id: CustomerId) -> Option<&Customer> { self.customers.iter().find(|c| c.db_id == Some(id)) }

    /// Replace the list with the server's. On failure the previous list stays.
    pub async fn list(&mut self) -> AppResult<()> {
        self.loading = true;
        let result = match self.ctx.backend.get_customers().await {
            Ok(resp) => resp.expect_status(OK, "Failed to fetch customers").and_then(|r| r.into_data()),
            Err(e) => Err(e),
        };
        self.loading = false;
        match result {
            Ok(customers) => {
                debug!(target: "ispdesk::customers", "fetched {} customers", customers.len());
                self.customers = customers;
                Ok(())
            }
            Err(e) => {
                warn!(target: "ispdesk::customers", "fetch failed: {}", e);
                self.ctx.notify(Notice::error("Error", "Failed to fetch customers"));
                Err(e)
            }
        }
    }

    pub async fn view(&self, id: CustomerId) -> AppResult<Customer> {
        if !self.caps.view_customers {
            return Err(denied("view customers"));
        }
        let result = match self.ctx.backend.get_customer(id).await {
            Ok(resp) => resp.expect_status(OK, "Error fetching customer data").and_then(|r| r.into_data()),
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            self.ctx.notify(Notice::error("Error fetching customer data", e.message()));
            e
        })
    }

    pub fn open_new(&mut self) -> AppResult<()> {
        if !self.caps.create_customers {
            return Err(denied("create customers"));
        }
        self.editor = Editor::New;
        Ok(())
    }

    pub fn open_edit(&mut self, customer: Customer) -> AppResult<()> {
        if !self.caps.modify_customers {
            return Err(denied("edit customers"));
        }
        self.editor = Editor::Editing(customer);
        Ok(())
    }

    pub fn close_editor(&mut self) { self.editor.close(); }

    /// Submit the open editor: update when editing an existing record, create otherwise.
    pub async fn submit(&mut self, form: &CustomerForm) -> AppResult<()> {
        match self.editor.selected().and_then(|c| c.db_id) {
            Some(id) => self.update(id, form).await,
            None => self.create(form).await,
        }
    }

    pub async fn create(&mut self, form: &CustomerForm) -> AppResult<()> {
        if !self.caps.create_customers {
            return Err(denied("create customers"));
        }
        let payload = self.checked_payload(form)?;
        self.busy.set(Busy::Creating, true);
        let result = match self.ctx.backend.create_customer(&payload).await {
            Ok(resp) => resp.expect_status(CREATED, "Failed to create customer").map(|_| ()),
            Err(e) => Err(e),
        };
        self.busy.set(Busy::Creating, false);
        self.after_save(result, "created", "create").await
    }

    pub async fn update(&mut self, id: CustomerId, form: &CustomerForm) -> AppResult<()> {
        if !self.caps.modify_customers {
            return Err(denied("edit customers"));
        }
        let payload = self.checked_payload(form)?;
        self.busy.set(Busy::Updating, true);
        let result = match self.ctx.backend.update_customer(id, &payload).await {
            Ok(resp) => resp.expect_status(OK, "Unable to update customer").map(|_| ()),
            Err(e) => Err(e),
        };
        self.busy.set(Busy::Updating, false);
        self.after_save(result, "updated", "update").await
    }

    /// First half of a delete: remember what the operator wants removed.
    pub fn request_delete(&mut self, customer: Customer) -> AppResult<()> {
        if !self.caps.modify_customers {
            return Err(denied("delete customers"));
        }
        if customer.db_id.is_none() {
            return Err(AppError::user("missing_id", "Customer has no identifier"));
        }
        self.pending_delete = Some(customer);
        Ok(())
    }

    pub fn cancel_delete(&mut self) { self.pending_delete = None; }

    /// Second half of a delete. Only a 204 counts as success.
    pub async fn confirm_delete(&mut self) -> AppResult<()> {
        let Some(id) = self.pending_delete.take().and_then(|c| c.db_id) else {
            return Err(AppError::user("nothing_to_delete", "No customer is awaiting deletion"));
        };
        self.busy.set(Busy::Deleting, true);
        let result = match self.ctx.backend.delete_customer(id).await {
            Ok(resp) => resp.expect_status(NO_CONTENT, "Failed to delete customer").map(|_| ()),
            Err(e) => Err(e),
        };
        self.busy.set(Busy::Deleting, false);
        match result {
            Ok(()) => {
                info!(target: "ispdesk::customers", "deleted customer id={}", id);
                self.ctx.notify(Notice::success("Success").with_description("Customer deleted successfully"));
                self.refresh().await;
                Ok(())
            }
            Err(e) => {
                warn!(target: "ispdesk::customers", "delete id={} failed: {}", id, e);
                self.ctx.notify(Notice::error("Error", "Failed to delete customer"));
                Err(e)
            }
        }
    }

    fn checked_payload(&self, form: &CustomerForm) -> AppResult<CustomerPayload> {
        let today = self.today.unwrap_or_else(|| chrono::Local::now().date_naive());
        if let Err(e) = validate_customer(form, today).into_result() {
            self.ctx.notify(Notice::error("Validation Error", "Please check the form for errors"));
            return Err(e);
        }
        CustomerPayload::try_from(form)
    }

    async fn after_save(&mut self, result: AppResult<()>, done: &str, verb: &str) -> AppResult<()> {
        match result {
            Ok(()) => {
                info!(target: "ispdesk::customers", "customer {}", done);
                self.ctx.notify(Notice::success("Success").with_description(format!("Customer {done} successfully")));
                self.editor.close();
                self.refresh().await;
                Ok(())
            }
            Err(e) => {
                warn!(target: "ispdesk::customers", "customer {} failed: {}", verb, e);
                self.ctx.notify(Notice::error("Error", format!("Failed to {verb} customer")));
                Err(e)
            }
        }
    }

    // A failed refetch has already notified; the mutation itself succeeded.
    async fn refresh(&mut self) {
        if let Err(e) = self.list().await {
            debug!(target: "ispdesk::customers", "refetch after mutation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Vec<Customer> {
        names.iter().map(|n| Customer { name: n.to_string(), ..Customer::default() }).collect()
    }

    #[test]
    fn filter_is_case_insensitive_and_idempotent() {
        let all = named(&["Wanjiru Njeri", "ACME Networks", "acme cafe", "Otieno"]);
        let hits = filter_customers(&all, "AcMe");
        assert_eq!(hits.len(), 2);

        let owned: Vec<Customer> = hits.iter().map(|c| (*c).clone()).collect();
        let again = filter_customers(&owned, "AcMe");
        assert_eq!(again.len(), hits.len());
        assert!(again.iter().zip(hits.iter()).all(|(a, b)| a.name == b.name));

        assert_eq!(filter_customers(&all, "").len(), 4);
    }
}
