use kivendi_auth::PasswordService;
use kivendi_common::AppError;
use rust_decimal::Decimal;
use sqlx::PgPool;

pub struct MigrationRunner {
    pool: PgPool,
}

/// Boost offers inserted by `seed_initial_data` when missing.
const DEFAULT_BOOST_OFFERS: &[(&str, &str, i32, i64, i32, &str, i32)] = &[
    ("Standard", "Remontée en tête de liste pendant 3 jours", 3, 500, 1, "#4CAF50", 1),
    ("Premium", "Mise en avant sur l'accueil pendant 7 jours", 7, 1500, 2, "#2196F3", 2),
    ("VIP", "Visibilité maximale pendant 30 jours", 30, 5000, 3, "#FF9800", 3),
];

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_all_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Starting database migrations...");
        crate::run_migrations(&self.pool).await?;
        tracing::info!("All migrations completed successfully");
        Ok(())
    }

    pub async fn check_migration_status(&self) -> Result<MigrationStatus, AppError> {
        let migrator = sqlx::migrate!("./migrations");
        let total = migrator.iter().count();

        let table_exists: bool =
            sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        let applied = if table_exists {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
                    .fetch_one(&self.pool)
                    .await?;
            count as usize
        } else {
            0
        };

        let pending = total.saturating_sub(applied);
        Ok(MigrationStatus {
            total,
            applied,
            pending,
            is_up_to_date: pending == 0,
        })
    }

    /// Creates the first admin account and the default boost offers.
    pub async fn seed_initial_data(&self, admin_email: &str, admin_password: &str) -> Result<(), AppError> {
        let admin_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admins WHERE email = $1)")
                .bind(admin_email)
                .fetch_one(&self.pool)
                .await?;

        if !admin_exists {
            let password_hash = PasswordService::hash_password(admin_password)?;

            sqlx::query(
                r#"
                INSERT INTO admins (first_name, last_name, email, password_hash, role)
                VALUES ($1, $2, $3, $4, 'admin')
                "#,
            )
            .bind("Super")
            .bind("Admin")
            .bind(admin_email)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

            tracing::info!(email = admin_email, "Admin account created");
        }

        for &(name, description, days, price, priority, color, order) in DEFAULT_BOOST_OFFERS {
            let inserted = sqlx::query(
                r#"
                INSERT INTO boost_offers
                    (name, description, duration_days, price, position_priority, color, display_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(name)
            .bind(description)
            .bind(days)
            .bind(Decimal::from(price))
            .bind(priority)
            .bind(color)
            .bind(order)
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() > 0 {
                tracing::info!(offer = name, "Boost offer seeded");
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct MigrationStatus {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub is_up_to_date: bool,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Migrations: {}/{} applied, {} pending",
            self.applied, self.total, self.pending
        )
    }
}
