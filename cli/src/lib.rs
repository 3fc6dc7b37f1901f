use std::io::Read;
use std::path::PathBuf;

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::Utc;
use clap::Parser;
use crm_gateway::EntityGateway;
use crm_gateway::config::GatewayConfig;
use crm_gateway::entity::Entity;
use crm_gateway::entity::team_member::NewTeamMember;
use crm_gateway::factory::Crm;
use crm_gateway::query::RelativeDate;
use crm_gateway::record::RecordId;
use crm_gateway::report::ActivityFilter;
use crm_gateway::transfer;
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// Command line access to the CRM record store.
#[derive(Debug, Parser)]
#[command(name = "crm", version)]
pub struct Cli {
    /// TOML file with gateway settings. `CRM_*` variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Tasks and their completion state.
    Tasks {
        #[command(subcommand)]
        cmd: TaskCommand,
    },
    /// Task categories.
    Categories {
        #[command(subcommand)]
        cmd: CategoryCommand,
    },
    /// Contacts.
    Contacts {
        #[command(subcommand)]
        cmd: CrudCommand,
    },
    /// Deals in the pipeline.
    Deals {
        #[command(subcommand)]
        cmd: DealCommand,
    },
    /// Leads and follow-ups.
    Leads {
        #[command(subcommand)]
        cmd: LeadCommand,
    },
    /// Sales reps.
    SalesReps {
        #[command(subcommand)]
        cmd: CrudCommand,
    },
    /// Team members and their access.
    Team {
        #[command(subcommand)]
        cmd: TeamCommand,
    },
    /// Read-only aggregates over leads, deals and reps.
    Analytics {
        #[command(subcommand)]
        cmd: AnalyticsCommand,
    },
    /// Write every record of a collection to stdout, one JSON object per line.
    Export { entity: Collection },
    /// Create records from JSON lines read on stdin.
    Import { entity: Collection },
}

/// Reporting period for lead lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Period {
    Today,
    Yesterday,
    Week,
    Month,
}

impl From<Period> for RelativeDate {
    fn from(period: Period) -> Self {
        match period {
            Period::Today => RelativeDate::Today,
            Period::Yesterday => RelativeDate::Yesterday,
            Period::Week => RelativeDate::ThisWeek,
            Period::Month => RelativeDate::ThisMonth,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Collection {
    Tasks,
    Categories,
    Contacts,
    Deals,
    Leads,
    SalesReps,
    Team,
}

/// Operations shared by every collection. JSON arguments may be `-` to read
/// from stdin.
#[derive(Debug, clap::Subcommand)]
pub enum CrudCommand {
    /// List every record.
    List,
    /// Show one record.
    Get { id: RecordId },
    /// Create a record from a JSON object.
    Create { json: String },
    /// Change the fields present in a JSON object.
    Update { id: RecordId, json: String },
    /// Delete one record.
    Delete { id: RecordId },
    /// Delete several records, reporting each id separately.
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<RecordId>,
    },
}

#[derive(Debug, clap::Subcommand)]
pub enum TaskCommand {
    #[command(flatten)]
    Crud(CrudCommand),
    /// Case-insensitive search in title and description.
    Search { text: String },
    /// Open tasks.
    Pending,
    /// Completed tasks that are not archived.
    Completed,
    /// Open tasks due before today.
    Overdue,
    /// Open tasks due today.
    DueToday,
    /// Tasks in one category.
    ByCategory { id: RecordId },
    /// Mark a task completed, or open again with `--undo`.
    Complete {
        id: RecordId,
        #[arg(long)]
        undo: bool,
    },
    /// Archive a task, or restore it with `--undo`.
    Archive {
        id: RecordId,
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Debug, clap::Subcommand)]
pub enum CategoryCommand {
    #[command(flatten)]
    Crud(CrudCommand),
    /// Non-archived task count per category id.
    Counts,
    /// Recompute task counts and store them on each category.
    RefreshCounts,
}

#[derive(Debug, clap::Subcommand)]
pub enum DealCommand {
    #[command(flatten)]
    Crud(CrudCommand),
    /// All deals, newest first.
    Recent,
    /// Deals created in a year, newest first.
    ByYear { year: i32 },
}

#[derive(Debug, clap::Subcommand)]
pub enum LeadCommand {
    #[command(flatten)]
    Crud(CrudCommand),
    /// All leads, newest first.
    Recent,
    /// Leads with a follow-up in the coming week.
    FollowUps {
        /// First day of the window (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        from: Option<NaiveDate>,
    },
    /// Leads created per sales rep on one day.
    DailyReport {
        /// Day to report (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Sites added, with totals by status and category.
    Activity {
        /// First creation day included (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last creation day included (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Exactly this creation day.
        #[arg(long, conflicts_with_all = ["from", "to"])]
        on: Option<NaiveDate>,
        /// Only leads added by this sales rep id.
        #[arg(long)]
        user: Option<RecordId>,
        /// Text to find in the website or category.
        #[arg(long)]
        search: Option<String>,
        /// Print spreadsheet rows instead of the report.
        #[arg(long)]
        export: bool,
    },
    /// Sites one rep added on one day.
    DailyUrls {
        #[arg(long)]
        rep: Option<RecordId>,
        /// Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, clap::Subcommand)]
pub enum TeamCommand {
    #[command(flatten)]
    Crud(CrudCommand),
    /// Add a pending member.
    Invite {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Option<String>,
    },
    /// Mark a member active and record the login time.
    Activate { id: RecordId },
    /// Mark a member inactive.
    Deactivate { id: RecordId },
}

#[derive(Debug, clap::Subcommand)]
pub enum AnalyticsCommand {
    /// Lead, meeting and closed-deal totals.
    Dashboard,
    /// Lead counts per period with status and category breakdowns.
    Leads {
        /// Only leads added by this sales rep id.
        #[arg(long)]
        user: Option<RecordId>,
    },
    /// Lead counts per sales rep.
    Performance,
    /// Share of leads at each funnel stage.
    Funnel,
    /// Monthly deal value for a year.
    Revenue {
        /// Defaults to the current year.
        #[arg(long)]
        year: Option<i32>,
    },
    /// New leads per day.
    Chart {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        user: Option<RecordId>,
    },
    /// Leads in a period, newest first.
    LeadList {
        /// All time when omitted.
        #[arg(long, value_enum)]
        period: Option<Period>,
        #[arg(long)]
        user: Option<RecordId>,
    },
    /// Leads one sales rep added in a period.
    UserLeads {
        user: RecordId,
        #[arg(long, value_enum, default_value_t = Period::Today)]
        period: Period,
    },
    /// Newest leads and deals as one feed.
    Recent {
        /// Newest leads only, sites without scheme.
        #[arg(long)]
        detailed: bool,
    },
    /// Meeting-stage deals created today.
    Meetings,
    /// Sales reps by lead count.
    Rankings,
    /// New leads per day over two weeks.
    LeadChart,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_payload(arg: &str) -> anyhow::Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(arg.to_string())
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(arg: &str) -> anyhow::Result<T> {
    let text = read_payload(arg)?;
    serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("invalid JSON payload: {e}"))
}

async fn crud<E: Entity>(gateway: &EntityGateway<E>, cmd: CrudCommand) -> anyhow::Result<()> {
    match cmd {
        CrudCommand::List => print_json(&gateway.get_all().await),
        CrudCommand::Get { id } => print_json(&gateway.get_by_id(id).await?),
        CrudCommand::Create { json } => {
            let input: E::Input = parse_payload(&json)?;
            print_json(&gateway.create(&input).await?)
        }
        CrudCommand::Update { id, json } => {
            let patch: E::Patch = parse_payload(&json)?;
            print_json(&gateway.update(id, &patch).await?)
        }
        CrudCommand::Delete { id } => {
            gateway.delete(id).await?;
            print_json(&json!({ "Id": id, "success": true }))
        }
        CrudCommand::BulkDelete { ids } => print_json(&gateway.bulk_delete(&ids).await),
    }
}

async fn export<E: Entity>(gateway: &EntityGateway<E>) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    let count = transfer::export_jsonl(gateway, &mut out).await?;
    info!(count, "exported records");
    Ok(())
}

async fn import<E: Entity>(gateway: &EntityGateway<E>) -> anyhow::Result<()> {
    let mut input = std::io::stdin();
    let count = transfer::import_jsonl(gateway, &mut input).await?;
    print_json(&json!({ "imported": count }))
}

/// Execute a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = GatewayConfig::load(cli.config.as_deref())?;
    let crm = Crm::open(&config)?;
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Tasks { cmd } => match cmd {
            TaskCommand::Crud(cmd) => crud(&crm.tasks, cmd).await,
            TaskCommand::Search { text } => print_json(&crm.tasks.search(&text).await),
            TaskCommand::Pending => print_json(&crm.tasks.pending().await),
            TaskCommand::Completed => print_json(&crm.tasks.completed().await),
            TaskCommand::Overdue => print_json(&crm.tasks.overdue_on(today).await),
            TaskCommand::DueToday => print_json(&crm.tasks.due_on(today).await),
            TaskCommand::ByCategory { id } => print_json(&crm.tasks.by_category(id).await),
            TaskCommand::Complete { id, undo } => {
                print_json(&crm.tasks.set_completed(id, !undo).await?)
            }
            TaskCommand::Archive { id, undo } => print_json(&crm.tasks.archive(id, !undo).await?),
        },
        Command::Categories { cmd } => match cmd {
            CategoryCommand::Crud(cmd) => crud(&crm.categories, cmd).await,
            CategoryCommand::Counts => print_json(&crm.categories.task_counts(&crm.tasks).await),
            CategoryCommand::RefreshCounts => {
                print_json(&crm.categories.refresh_task_counts(&crm.tasks).await)
            }
        },
        Command::Contacts { cmd } => crud(&crm.contacts, cmd).await,
        Command::Deals { cmd } => match cmd {
            DealCommand::Crud(cmd) => crud(&crm.deals, cmd).await,
            DealCommand::Recent => print_json(&crm.deals.all_newest_first().await),
            DealCommand::ByYear { year } => print_json(&crm.deals.by_year(year).await),
        },
        Command::Leads { cmd } => match cmd {
            LeadCommand::Crud(cmd) => crud(&crm.leads, cmd).await,
            LeadCommand::Recent => print_json(&crm.leads.all_newest_first().await),
            LeadCommand::FollowUps { from } => {
                print_json(&crm.leads.pending_follow_ups_from(from.unwrap_or(today)).await)
            }
            LeadCommand::DailyReport { date } => print_json(
                &crm.leads
                    .daily_report_for(&crm.sales_reps, date.unwrap_or(today))
                    .await,
            ),
            LeadCommand::Activity {
                from,
                to,
                on,
                user,
                search,
                export,
            } => {
                let filter = ActivityFilter {
                    from,
                    to,
                    on,
                    added_by: user,
                    search,
                };
                if export {
                    print_json(&crm.leads.export_activity(&filter).await)
                } else {
                    print_json(&crm.leads.activity(&filter).await)
                }
            }
            LeadCommand::DailyUrls { rep, date } => {
                print_json(&crm.leads.daily_urls(rep, Some(date.unwrap_or(today))).await)
            }
        },
        Command::SalesReps { cmd } => crud(&crm.sales_reps, cmd).await,
        Command::Team { cmd } => match cmd {
            TeamCommand::Crud(cmd) => crud(&crm.team, cmd).await,
            TeamCommand::Invite { name, email, role } => {
                let member = NewTeamMember {
                    name,
                    email,
                    role,
                    ..NewTeamMember::default()
                };
                print_json(&crm.team.invite(&member).await?)
            }
            TeamCommand::Activate { id } => print_json(&crm.team.activate(id).await?),
            TeamCommand::Deactivate { id } => print_json(&crm.team.deactivate(id).await?),
        },
        Command::Analytics { cmd } => match cmd {
            AnalyticsCommand::Dashboard => print_json(&crm.analytics.dashboard_metrics().await),
            AnalyticsCommand::Leads { user } => {
                print_json(&crm.analytics.leads_metrics(user).await)
            }
            AnalyticsCommand::Performance => print_json(&crm.analytics.user_performance().await),
            AnalyticsCommand::Funnel => print_json(&crm.analytics.sales_funnel().await),
            AnalyticsCommand::Revenue { year } => print_json(
                &crm.analytics
                    .revenue_trends(year.unwrap_or_else(|| today.year()))
                    .await,
            ),
            AnalyticsCommand::Chart { days, user } => print_json(
                &crm.analytics
                    .daily_leads_chart_until(today, days, user)
                    .await,
            ),
            AnalyticsCommand::LeadList { period, user } => print_json(
                &crm.analytics
                    .leads_analytics(period.map(RelativeDate::from), user)
                    .await,
            ),
            AnalyticsCommand::UserLeads { user, period } => {
                print_json(&crm.analytics.user_leads_report(user, period.into()).await)
            }
            AnalyticsCommand::Recent { detailed: false } => {
                print_json(&crm.analytics.recent_activity().await)
            }
            AnalyticsCommand::Recent { detailed: true } => {
                print_json(&crm.analytics.detailed_recent_activity().await)
            }
            AnalyticsCommand::Meetings => print_json(&crm.analytics.todays_meetings().await),
            AnalyticsCommand::Rankings => print_json(&crm.analytics.team_rankings().await),
            AnalyticsCommand::LeadChart => {
                print_json(&crm.analytics.lead_performance_chart().await)
            }
        },
        Command::Export { entity } => match entity {
            Collection::Tasks => export(&crm.tasks).await,
            Collection::Categories => export(&crm.categories).await,
            Collection::Contacts => export(&crm.contacts).await,
            Collection::Deals => export(&crm.deals).await,
            Collection::Leads => export(&crm.leads).await,
            Collection::SalesReps => export(&crm.sales_reps).await,
            Collection::Team => export(&crm.team).await,
        },
        Command::Import { entity } => match entity {
            Collection::Tasks => import(&crm.tasks).await,
            Collection::Categories => import(&crm.categories).await,
            Collection::Contacts => import(&crm.contacts).await,
            Collection::Deals => import(&crm.deals).await,
            Collection::Leads => import(&crm.leads).await,
            Collection::SalesReps => import(&crm.sales_reps).await,
            Collection::Team => import(&crm.team).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flattened_crud_and_extras_parse() {
        let cli = Cli::try_parse_from(["crm", "tasks", "bulk-delete", "1", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Tasks {
                cmd: TaskCommand::Crud(CrudCommand::BulkDelete { ref ids })
            } if ids == &vec![1, 2]
        ));
        let cli = Cli::try_parse_from(["crm", "leads", "follow-ups", "--from", "2026-10-01"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Leads {
                cmd: LeadCommand::FollowUps { from: Some(_) }
            }
        ));
    }

    #[test]
    fn activity_day_excludes_a_range() {
        let cli = Cli::try_parse_from(["crm", "leads", "activity", "--search", "saas", "--export"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Leads {
                cmd: LeadCommand::Activity { export: true, ref search, .. }
            } if search.as_deref() == Some("saas")
        ));
        assert!(
            Cli::try_parse_from([
                "crm", "leads", "activity", "--on", "2026-10-01", "--from", "2026-09-01"
            ])
            .is_err()
        );
    }

    #[test]
    fn user_leads_period_defaults_to_today() {
        let cli = Cli::try_parse_from(["crm", "analytics", "user-leads", "4"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Analytics {
                cmd: AnalyticsCommand::UserLeads {
                    user: 4,
                    period: Period::Today
                }
            }
        ));
    }
}
