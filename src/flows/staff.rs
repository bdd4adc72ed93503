//! Staff management screen.
//!
//! A staff account spans three systems: an identity-provider account, a role document keyed
//! by that account's identifier, and the backend's staff record. Create, update and delete
//! each run as a [`Saga`] over those systems, strictly one step after another.

use tracing::{debug, info, warn};

use super::saga::{Saga, SagaKind, SagaLog, SagaStep};
use super::{matches_query, Busy, BusyFlags, Editor};
use crate::backend::{CREATED, NO_CONTENT, OK};
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::identity::{Capabilities, ProvisioningSession};
use crate::model::{RoleRecord, StaffForm, StaffId, StaffMember, StaffPayload};
use crate::notify::Notice;
use crate::validate::{validate_staff, FormMode};

/// Staff whose username contains `query`, ignoring case.
pub fn filter_staff<'a>(staff: &'a [StaffMember], query: &str) -> Vec<&'a StaffMember> {
    staff.iter().filter(|m| matches_query(&m.username, query)).collect()
}

fn missing_record() -> AppError {
    AppError::not_found("role_record_missing", "Staff member not found in role store")
}

async fn create_steps(ctx: &AppContext, saga: &mut Saga, form: &StaffForm) -> AppResult<()> {
    let mut session = saga.run(SagaStep::ProvisionAccount, ctx.identity.provision(&form.email, &form.password)).await?;
    let uid = session.uid().to_string();

    let token = match saga.run(SagaStep::IssueToken, session.id_token()).await {
        Ok(t) => t,
        Err(e) => {
            release(saga, session.as_mut()).await;
            return Err(e);
        }
    };
    let record = RoleRecord::for_staff(form, Some(token));
    if let Err(e) = saga.run(SagaStep::WriteRoleRecord, ctx.roles.put(&uid, &record)).await {
        release(saga, session.as_mut()).await;
        return Err(e);
    }
    saga.run(SagaStep::SignOutProvisioner, session.sign_out()).await?;

    let payload = StaffPayload::for_create(form);
    saga.run(SagaStep::RegisterStaff, async {
        ctx.backend.add_staff(&payload).await?.expect_status(CREATED, "Unable to add staff").map(|_| ())
    })
    .await
}

/// The provisioning session must not outlive a failed create.
async fn release(saga: &mut Saga, session: &mut dyn ProvisioningSession) {
    if session.is_active() {
        saga.best_effort(SagaStep::SignOutProvisioner, session.sign_out()).await;
    }
}

async fn update_steps(ctx: &AppContext, saga: &mut Saga, id: StaffId, lookup_email: &str, form: &StaffForm) -> AppResult<()> {
    let (uid, existing) = saga
        .run(SagaStep::LookupRoleRecord, async { ctx.roles.find_by_email(lookup_email).await?.ok_or_else(missing_record) })
        .await?;
    saga.run(SagaStep::WriteRoleRecord, ctx.roles.put(&uid, &existing.merged_with(form))).await?;

    let payload = StaffPayload::for_update(form);
    saga.run(SagaStep::UpdateStaff, async {
        ctx.backend.update_staff(id, &payload).await?.expect_status(OK, "Unable to update staff").map(|_| ())
    })
    .await
}

async fn delete_steps(ctx: &AppContext, saga: &mut Saga, member: &StaffMember) -> AppResult<()> {
    let (uid, token) = saga
        .run(SagaStep::LookupRoleRecord, async {
            let (uid, record) = ctx.roles.find_by_email(&member.email).await?.ok_or_else(missing_record)?;
            match record.id_token.filter(|t| !t.is_empty()) {
                Some(token) => Ok((uid, token)),
                None => Err(AppError::not_found(
                    "role_record_missing",
                    "Staff member not found in role store or ID token is missing",
                )),
            }
        })
        .await?;
    saga.best_effort(SagaStep::DeleteIdentityAccount, ctx.identity.delete_account(&token)).await;
    saga.run(SagaStep::DeleteRoleRecord, ctx.roles.delete(&uid)).await?;
    saga.run(SagaStep::DeleteStaff, async {
        ctx.backend.delete_staff(member.id).await?.expect_status(NO_CONTENT, "Unable to delete staff member").map(|_| ())
    })
    .await
}

pub struct StaffDirectory {
    ctx: AppContext,
    caps: Capabilities,
    staff: Vec<StaffMember>,
    search: String,
    loading: bool,
    busy: BusyFlags,
    editor: Editor<StaffMember>,
    pending_delete: Option<StaffMember>,
    last_saga: Option<SagaLog>,
}

impl StaffDirectory {
    pub fn new(ctx: AppContext, caps: Capabilities) -> Self {
        Self {
            ctx,
            caps,
            staff: Vec::new(),
            search: String::new(),
            loading: false,
            busy: BusyFlags::default(),
            editor: Editor::Closed,
            pending_delete: None,
            last_saga: None,
        }
    }

    pub fn staff(&self) -> &[StaffMember] { &self.staff }
    pub fn is_loading(&self) -> bool { self.loading }
    pub fn busy(&self) -> BusyFlags { self.busy }
    pub fn editor(&self) -> &Editor<StaffMember> { &self.editor }
    pub fn pending_delete(&self) -> Option<&StaffMember> { self.pending_delete.as_ref() }
    pub fn search(&self) -> &str { &self.search }

    /// Step log of the most recent create, update or delete, successful or not.
    pub fn last_saga(&self) -> Option<&SagaLog> { self.last_saga.as_ref() }

    pub fn set_search(&mut self, query: impl Into<String>) { self.search = query.into(); }

    pub fn filtered(&self) -> Vec<&StaffMember> { filter_staff(&self.staff, &self.search) }

    pub fn find(&self, id: StaffId) -> Option<&StaffMember> { self.staff.iter().find(|m| m.id == id) }

    fn require_admin(&self) -> AppResult<()> {
        if self.caps.manage_staff {
            Ok(())
        } else {
            Err(AppError::forbidden("insufficient_role", "You do not have permission to manage staff."))
        }
    }

    pub async fn list(&mut self) -> AppResult<()> {
        self.require_admin()?;
        self.loading = true;
        let result = match self.ctx.backend.get_staff().await {
            Ok(resp) => resp.expect_status(OK, "Unable to fetch staff").and_then(|r| r.into_data()),
            Err(e) => Err(e),
        };
        self.loading = false;
        match result {
            Ok(staff) => {
                debug!(target: "ispdesk::staff", "fetched {} staff", staff.len());
                self.staff = staff;
                Ok(())
            }
            Err(e) => {
                warn!(target: "ispdesk::staff", "fetch failed: {}", e);
                self.ctx.notify(Notice::error("Error fetching staff", e.message()));
                Err(e)
            }
        }
    }

    pub fn open_new(&mut self) -> AppResult<()> {
        self.require_admin()?;
        self.editor = Editor::New;
        Ok(())
    }

    pub fn open_edit(&mut self, member: StaffMember) -> AppResult<()> {
        self.require_admin()?;
        self.editor = Editor::Editing(member);
        Ok(())
    }

    pub fn close_editor(&mut self) { self.editor.close(); }

    pub async fn submit(&mut self, form: &StaffForm) -> AppResult<SagaLog> {
        match self.editor.selected().map(|m| m.id) {
            Some(id) => self.update(id, form).await,
            None => self.create(form).await,
        }
    }

    /// Provision the account, write its role document, sign the provisioning session out and
    /// register the member with the backend.
    pub async fn create(&mut self, form: &StaffForm) -> AppResult<SagaLog> {
        self.require_admin()?;
        self.check_form(form, FormMode::Create)?;
        self.busy.set(Busy::Creating, true);
        let mut saga = Saga::begin(SagaKind::CreateStaff, &form.email);
        let result = create_steps(&self.ctx, &mut saga, form).await;
        self.busy.set(Busy::Creating, false);
        self.conclude(saga, result, "Staff added successfully", "Error adding staff", true).await
    }

    /// Rewrite the role document (keeping its stored token) then update the backend record.
    /// The document is located by the member's current email, falling back to the form's.
    pub async fn update(&mut self, id: StaffId, form: &StaffForm) -> AppResult<SagaLog> {
        self.require_admin()?;
        self.check_form(form, FormMode::Edit)?;
        let lookup_email = self.find(id).map(|m| m.email.clone()).unwrap_or_else(|| form.email.clone());
        self.busy.set(Busy::Updating, true);
        let mut saga = Saga::begin(SagaKind::UpdateStaff, &lookup_email);
        let result = update_steps(&self.ctx, &mut saga, id, &lookup_email, form).await;
        self.busy.set(Busy::Updating, false);
        self.conclude(saga, result, "Staff updated successfully", "Error updating staff", true).await
    }

    pub fn request_delete(&mut self, member: StaffMember) -> AppResult<()> {
        self.require_admin()?;
        self.pending_delete = Some(member);
        Ok(())
    }

    pub fn cancel_delete(&mut self) { self.pending_delete = None; }

    /// Identity-account deletion is best effort; success is decided by the backend's 204.
    pub async fn confirm_delete(&mut self) -> AppResult<SagaLog> {
        let Some(member) = self.pending_delete.take() else {
            return Err(AppError::user("nothing_to_delete", "No staff member is awaiting deletion"));
        };
        self.require_admin()?;
        self.busy.set(Busy::Deleting, true);
        let mut saga = Saga::begin(SagaKind::DeleteStaff, &member.email);
        let result = delete_steps(&self.ctx, &mut saga, &member).await;
        self.busy.set(Busy::Deleting, false);
        self.conclude(saga, result, "Staff deleted successfully", "Error deleting staff", false).await
    }

    fn check_form(&self, form: &StaffForm, mode: FormMode) -> AppResult<()> {
        validate_staff(form, mode).into_result().map_err(|e| {
            self.ctx.notify(Notice::error("Validation Error", "Please check the form for errors"));
            e
        })
    }

    async fn conclude(
        &mut self,
        saga: Saga,
        result: AppResult<()>,
        ok_title: &str,
        err_title: &str,
        close_editor: bool,
    ) -> AppResult<SagaLog> {
        match saga.finish(result) {
            Ok(((), log)) => {
                info!(target: "ispdesk::staff", "{}", log.summary());
                self.last_saga = Some(log.clone());
                self.ctx.notify(Notice::success(ok_title));
                if close_editor {
                    self.editor.close();
                }
                if let Err(e) = self.list().await {
                    debug!(target: "ispdesk::staff", "refetch after mutation failed: {}", e);
                }
                Ok(log)
            }
            Err(failure) => {
                self.ctx.notify(Notice::error(err_title, failure.error.message()));
                self.last_saga = Some(failure.log);
                Err(failure.error)
            }
        }
    }
}
