//! Interactive operator console.
//!
//! Line editing runs on a dedicated thread (rustyline blocks); the async side asks it for one
//! line at a time. Every screen command is gated through a [`RouteGuard`] for its page, and a
//! guard that admits a new principal rebuilds that page's directory and loads it.

pub mod table;

use std::collections::HashMap;
use std::sync::mpsc;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::flows::account;
use crate::flows::customers::CustomerDirectory;
use crate::flows::staff::StaffDirectory;
use crate::identity::{Capabilities, GuardDecision, Page, Redirect, RouteGuard, SessionResolver, SessionState};
use crate::model::{date_only, Customer, CustomerForm, StaffForm, StaffMember};
use crate::notify::{Notice, NoticeLevel, Notifier};
use table::Table;

/// Prints notices to the terminal, one line each.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, n: Notice) {
        let (color, tag) = match n.level {
            NoticeLevel::Success => ("\x1b[32m", "ok"),
            NoticeLevel::Info => ("\x1b[36m", "info"),
            NoticeLevel::Warning => ("\x1b[33m", "warn"),
            NoticeLevel::Error => ("\x1b[31m", "error"),
        };
        match n.description {
            Some(d) => println!("{color}[{tag}]\x1b[0m {}: {}", n.title, d),
            None => println!("{color}[{tag}]\x1b[0m {}", n.title),
        }
    }
}

type LineRequest = (String, oneshot::Sender<Option<String>>);

/// Handle to the readline thread.
struct LineReader {
    tx: mpsc::Sender<LineRequest>,
}

impl LineReader {
    fn spawn() -> AppResult<Self> {
        let (tx, rx) = mpsc::channel::<LineRequest>();
        std::thread::Builder::new()
            .name("ispdesk-readline".into())
            .spawn(move || {
                let mut rl = match rustyline::DefaultEditor::new() {
                    Ok(editor) => editor,
                    Err(e) => {
                        // dropping `rx` makes every read report end of input
                        error!(target: "ispdesk::console", "failed to create line editor: {}", e);
                        return;
                    }
                };
                while let Ok((prompt, reply)) = rx.recv() {
                    let line = match rl.readline(&prompt) {
                        Ok(line) => {
                            if !line.trim().is_empty() {
                                let _ = rl.add_history_entry(line.as_str());
                            }
                            Some(line)
                        }
                        // Ctrl+C abandons the current line only
                        Err(rustyline::error::ReadlineError::Interrupted) => Some(String::new()),
                        Err(rustyline::error::ReadlineError::Eof) => None,
                        Err(e) => {
                            error!(target: "ispdesk::console", "readline error: {}", e);
                            None
                        }
                    };
                    if reply.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self { tx })
    }

    /// `None` on end of input.
    async fn read(&self, prompt: &str) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        self.tx.send((prompt.to_string(), reply)).ok()?;
        answer.await.ok().flatten()
    }

    /// Prompt for a field, keeping `current` when the operator just presses enter.
    async fn field(&self, label: &str, current: &str) -> Option<String> {
        let prompt = if current.is_empty() { format!("  {label}: ") } else { format!("  {label} [{current}]: ") };
        let line = self.read(&prompt).await?;
        let line = line.trim();
        Some(if line.is_empty() { current.to_string() } else { line.to_string() })
    }

    async fn flag(&self, label: &str, current: bool) -> Option<bool> {
        let answer = self.field(&format!("{label} (y/n)"), if current { "y" } else { "n" }).await?;
        Some(matches!(answer.to_lowercase().as_str(), "y" | "yes" | "true" | "1"))
    }

    async fn confirm(&self, question: &str) -> bool {
        matches!(self.read(&format!("{question} Type 'yes' to confirm: ")).await.as_deref().map(str::trim), Some("yes"))
    }
}

pub const HELP: &str = "Commands:
  login                     sign in with email and password
  logout                    sign out
  whoami                    show the signed-in principal and role
  reset-password <email>    send a password reset email
  customers [query]         list customers, optionally filtered by name
  customer <id>             show one customer with subscriptions
  add-customer              create a customer
  edit-customer <id>        edit a customer (admin)
  delete-customer <id>      delete a customer (admin)
  staff [query]             list staff, optionally filtered by username (admin)
  add-staff                 create a staff account (admin)
  edit-staff <id>           edit a staff account (admin)
  delete-staff <id>         delete a staff account (admin)
  saga                      show the step log of the last staff change
  help                      show this help
  quit | exit               leave the console";

pub struct Console {
    ctx: AppContext,
    session: SessionResolver,
    reader: LineReader,
    guards: HashMap<Page, RouteGuard>,
    customers: Option<CustomerDirectory>,
    staff: Option<StaffDirectory>,
}

enum Flow {
    Continue,
    Quit,
}

impl Console {
    pub fn new(ctx: AppContext) -> AppResult<Self> {
        let session = ctx.resolve_session();
        let guards = [Page::Customers, Page::CustomerDetail, Page::Staff]
            .into_iter()
            .map(|p| (p, RouteGuard::new(p)))
            .collect();
        Ok(Self { ctx, session, reader: LineReader::spawn()?, guards, customers: None, staff: None })
    }

    pub async fn run(mut self) -> AppResult<()> {
        println!("ispdesk console. Type 'help' for commands.");
        if self.session.settled().await.principal.is_none() {
            self.login().await;
        }
        loop {
            let Some(line) = self.reader.read("ispdesk> ").await else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.dispatch(line).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => print_error(&e),
            }
        }
        self.session.unsubscribe();
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> AppResult<Flow> {
        let (cmd, rest) = line.split_once(char::is_whitespace).map(|(c, r)| (c, r.trim())).unwrap_or((line, ""));
        debug!(target: "ispdesk::console", "command {}", cmd);
        match cmd.to_lowercase().as_str() {
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => println!("{HELP}"),
            "login" => self.login().await,
            "logout" => {
                account::sign_out(&self.ctx).await?;
                self.session.settled_for(None).await;
            }
            "whoami" => self.whoami(),
            "reset-password" => account::request_password_reset(&self.ctx, rest).await?,
            "customers" => self.list_customers(rest).await?,
            "customer" => self.show_customer(parse_id(rest)?).await?,
            "add-customer" => self.add_customer().await?,
            "edit-customer" => self.edit_customer(parse_id(rest)?).await?,
            "delete-customer" => self.delete_customer(parse_id(rest)?).await?,
            "staff" => self.list_staff(rest).await?,
            "add-staff" => self.add_staff().await?,
            "edit-staff" => self.edit_staff(parse_id(rest)?).await?,
            "delete-staff" => self.delete_staff(parse_id(rest)?).await?,
            "saga" => self.show_saga(),
            other => println!("unknown command '{other}'. Type 'help' for commands."),
        }
        Ok(Flow::Continue)
    }

    async fn login(&mut self) {
        let Some(email) = self.reader.field("email", "").await else { return };
        let Some(password) = self.reader.read("  password: ").await else { return };
        if let Ok((principal, role, _)) = account::sign_in(&self.ctx, &email, password.trim()).await {
            self.session.settled_for(Some(&principal.uid)).await;
            println!("signed in as {} ({})", principal.email, role);
        }
    }

    fn whoami(&self) {
        let s = self.session.current();
        match (&s.principal, &s.role) {
            (Some(p), Some(r)) => println!("{} uid={} role={}", p.email, p.uid, r),
            (Some(p), None) => println!("{} uid={} role=<none>", p.email, p.uid),
            (None, _) => println!("not signed in"),
        }
    }

    /// Run the page's guard against the settled session. Returns whether the page may render
    /// and, on a fresh admission, the capabilities to rebuild its directory with.
    async fn admit(&mut self, page: Page) -> AppResult<Option<Capabilities>> {
        let state: SessionState = self.session.settled().await;
        let Some(guard) = self.guards.get_mut(&page) else {
            return Err(AppError::internal("missing_guard", format!("no guard for page {}", page.as_str())));
        };
        match guard.evaluate(&state) {
            GuardDecision::Pending => Err(AppError::auth("session_resolving", "Session is still resolving")),
            GuardDecision::Allow { fetch } => {
                let caps = Capabilities::for_role(state.role.as_ref());
                Ok(Some(caps).filter(|_| fetch))
            }
            GuardDecision::Redirect { to, notice } => {
                self.ctx.notify(notice);
                match to {
                    Redirect::SignIn => println!("sign in with 'login' to continue"),
                    Redirect::Back => println!("returning to the previous page"),
                }
                Err(AppError::forbidden("access_denied", format!("access to {} denied", page.as_str())))
            }
        }
    }

    /// The customer directory for `page`, rebuilt and loaded when the guard admits a new
    /// principal. The flag tells whether that load just happened.
    async fn customer_dir_fresh(&mut self, page: Page) -> AppResult<(&mut CustomerDirectory, bool)> {
        let fresh = match self.admit(page).await? {
            Some(caps) => {
                let mut dir = self.ctx.customers(caps);
                // a failed load has already been reported
                let _ = dir.list().await;
                self.customers = Some(dir);
                true
            }
            None => false,
        };
        let dir = self
            .customers
            .as_mut()
            .ok_or_else(|| AppError::internal("directory_missing", "customer directory not loaded"))?;
        Ok((dir, fresh))
    }

    async fn customer_dir(&mut self, page: Page) -> AppResult<&mut CustomerDirectory> {
        Ok(self.customer_dir_fresh(page).await?.0)
    }

    async fn staff_dir_fresh(&mut self) -> AppResult<(&mut StaffDirectory, bool)> {
        let fresh = match self.admit(Page::Staff).await? {
            Some(caps) => {
                let mut dir = self.ctx.staff(caps);
                let _ = dir.list().await;
                self.staff = Some(dir);
                true
            }
            None => false,
        };
        let dir = self.staff.as_mut().ok_or_else(|| AppError::internal("directory_missing", "staff directory not loaded"))?;
        Ok((dir, fresh))
    }

    async fn staff_dir(&mut self) -> AppResult<&mut StaffDirectory> { Ok(self.staff_dir_fresh().await?.0) }

    async fn list_customers(&mut self, query: &str) -> AppResult<()> {
        let (dir, fresh) = self.customer_dir_fresh(Page::Customers).await?;
        if !fresh {
            dir.list().await?;
        }
        dir.set_search(query);
        println!("{}", customer_table(&dir.filtered()).render());
        Ok(())
    }

    async fn show_customer(&mut self, id: i64) -> AppResult<()> {
        let dir = self.customer_dir(Page::CustomerDetail).await?;
        let c = dir.view(id).await?;
        println!("{} (#{})", c.name, c.db_id.unwrap_or(id));
        println!("  phone: {}  email: {}", c.phone, c.email);
        println!("  balance: {:.2}  router: {}", c.balance.unwrap_or(0.0), c.router_ip_address.as_deref().unwrap_or("-"));
        let mut t = Table::new(["router", "bandwidth", "amount", "active", "start", "end", "last payment"]);
        for s in &c.subscriptions {
            t.push(vec![
                s.router_ip_address.clone().unwrap_or_default(),
                s.bandwidth.map(|b| b.to_string()).unwrap_or_default(),
                s.subscription_amount.map(|a| format!("{a:.2}")).unwrap_or_default(),
                if s.is_active { "yes".into() } else { "no".into() },
                date_only(s.start_date.as_deref()),
                date_only(s.end_date.as_deref()),
                date_only(s.last_payment_date.as_deref()),
            ]);
        }
        println!("{}", t.render());
        Ok(())
    }

    async fn add_customer(&mut self) -> AppResult<()> {
        self.customer_dir(Page::Customers).await?.open_new()?;
        let Some(form) = prompt_customer(&self.reader, CustomerForm::default()).await else { return Ok(()) };
        self.submit_customer(form).await
    }

    async fn edit_customer(&mut self, id: i64) -> AppResult<()> {
        let dir = self.customer_dir(Page::Customers).await?;
        let customer = dir
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("customer_not_found", format!("no customer with id {id}")))?;
        let form = CustomerForm::from_customer(&customer);
        dir.open_edit(customer)?;
        let Some(form) = prompt_customer(&self.reader, form).await else { return Ok(()) };
        self.submit_customer(form).await
    }

    async fn submit_customer(&mut self, form: CustomerForm) -> AppResult<()> {
        let dir = self.customer_dir(Page::Customers).await?;
        let result = dir.submit(&form).await;
        if result.is_err() {
            dir.close_editor();
        }
        result
    }

    async fn delete_customer(&mut self, id: i64) -> AppResult<()> {
        let dir = self.customer_dir(Page::Customers).await?;
        let customer = dir
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("customer_not_found", format!("no customer with id {id}")))?;
        let name = customer.name.clone();
        dir.request_delete(customer)?;
        if self.reader.confirm(&format!("Delete customer '{name}'?")).await {
            self.customer_dir(Page::Customers).await?.confirm_delete().await
        } else {
            self.customer_dir(Page::Customers).await?.cancel_delete();
            println!("cancelled");
            Ok(())
        }
    }

    async fn list_staff(&mut self, query: &str) -> AppResult<()> {
        let (dir, fresh) = self.staff_dir_fresh().await?;
        if !fresh {
            dir.list().await?;
        }
        dir.set_search(query);
        println!("{}", staff_table(&dir.filtered()).render());
        Ok(())
    }

    async fn add_staff(&mut self) -> AppResult<()> {
        self.staff_dir().await?.open_new()?;
        let Some(form) = prompt_staff(&self.reader, StaffForm::default(), true).await else { return Ok(()) };
        self.submit_staff(form).await
    }

    async fn edit_staff(&mut self, id: i64) -> AppResult<()> {
        let dir = self.staff_dir().await?;
        let member = dir
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("staff_not_found", format!("no staff member with id {id}")))?;
        let form = StaffForm::from_member(&member);
        dir.open_edit(member)?;
        let Some(form) = prompt_staff(&self.reader, form, false).await else { return Ok(()) };
        self.submit_staff(form).await
    }

    async fn submit_staff(&mut self, form: StaffForm) -> AppResult<()> {
        let dir = self.staff_dir().await?;
        let result = dir.submit(&form).await;
        if result.is_err() {
            dir.close_editor();
        }
        result.map(|log| println!("{}", log.summary()))
    }

    async fn delete_staff(&mut self, id: i64) -> AppResult<()> {
        let dir = self.staff_dir().await?;
        let member: StaffMember = dir
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("staff_not_found", format!("no staff member with id {id}")))?;
        let username = member.username.clone();
        dir.request_delete(member)?;
        if self.reader.confirm(&format!("Delete staff member '{username}'?")).await {
            let log = self.staff_dir().await?.confirm_delete().await?;
            println!("{}", log.summary());
        } else {
            self.staff_dir().await?.cancel_delete();
            println!("cancelled");
        }
        Ok(())
    }

    fn show_saga(&self) {
        match self.staff.as_ref().and_then(|d| d.last_saga()) {
            Some(log) => {
                println!("{}", log.summary());
                let dangling = log.dangling_writes();
                if !dangling.is_empty() {
                    let names: Vec<&str> = dangling.iter().map(|s| s.as_str()).collect();
                    println!("left committed: {}", names.join(", "));
                }
            }
            None => println!("no staff changes yet"),
        }
    }
}

fn parse_id(arg: &str) -> AppResult<i64> {
    arg.trim().parse::<i64>().map_err(|_| AppError::user("invalid_id", format!("expected a numeric id, got '{arg}'")))
}

fn print_error(e: &AppError) {
    eprintln!("Error: {}", e.message());
    if let Some(fields) = e.fields() {
        for (field, msg) in fields.iter() {
            eprintln!("  {field}: {msg}");
        }
    }
}

async fn prompt_customer(r: &LineReader, mut f: CustomerForm) -> Option<CustomerForm> {
    f.name = r.field("name", &f.name).await?;
    f.phone = r.field("phone", &f.phone).await?;
    f.email = r.field("email", &f.email).await?;
    f.balance = r.field("balance", &f.balance).await?;
    f.router_ip_address = r.field("router ip", &f.router_ip_address).await?;
    f.bandwidth = r.field("bandwidth", &f.bandwidth).await?;
    f.subscription_amount = r.field("subscription amount", &f.subscription_amount).await?;
    f.start_date = r.field("start date (YYYY-MM-DD)", &f.start_date).await?;
    f.last_payment_date = r.field("last payment date (YYYY-MM-DD, optional)", &f.last_payment_date).await?;
    Some(f)
}

async fn prompt_staff(r: &LineReader, mut f: StaffForm, with_password: bool) -> Option<StaffForm> {
    f.username = r.field("username", &f.username).await?;
    f.email = r.field("email", &f.email).await?;
    f.first_name = r.field("first name", &f.first_name).await?;
    f.last_name = r.field("last name", &f.last_name).await?;
    f.is_superuser = r.flag("superuser", f.is_superuser).await?;
    if with_password {
        f.password = r.read("  password: ").await?;
        f.confirm_password = r.read("  confirm password: ").await?;
    }
    Some(f)
}

fn customer_table(customers: &[&Customer]) -> Table {
    let mut t = Table::new(["id", "name", "phone", "email", "balance", "router", "active"]);
    for c in customers {
        let active = c.primary_subscription().map(|s| s.is_active).unwrap_or(false);
        t.push(vec![
            c.db_id.map(|i| i.to_string()).unwrap_or_default(),
            c.name.clone(),
            c.phone.clone(),
            c.email.clone(),
            format!("{:.2}", c.balance.unwrap_or(0.0)),
            c.router_ip_address.clone().unwrap_or_default(),
            if active { "yes".into() } else { "no".into() },
        ]);
    }
    t
}

fn staff_table(staff: &[&StaffMember]) -> Table {
    let mut t = Table::new(["id", "username", "email", "name", "role"]);
    for m in staff {
        t.push(vec![
            m.id.to_string(),
            m.username.clone(),
            m.email.clone(),
            format!("{} {}", m.first_name, m.last_name).trim().to_string(),
            if m.is_superuser { "admin".into() } else { "user".into() },
        ]);
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id(" 42 ").unwrap(), 42);
        assert_eq!(parse_id("abc").unwrap_err().code_str(), "invalid_id");
    }

    #[test]
    fn staff_rows_show_role() {
        let m = StaffMember { id: 3, username: "ops".into(), is_superuser: true, first_name: "Ann".into(), ..Default::default() };
        let out = staff_table(&[&m]).render_with_width(200);
        assert!(out.contains("| admin |"));
        assert!(out.contains("| Ann  "));
    }
}
