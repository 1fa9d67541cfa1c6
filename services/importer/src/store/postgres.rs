use super::RecordStore;
use crate::models::{CanonicalDelivery, DeliveryKeys, ImportRecord, ReferencePeriod};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Postgres store over the dashboard schema (`db/schema.sql`).
///
/// Between `begin` and `commit` every call runs on one open transaction;
/// outside it calls go straight to the pool.
pub struct PgStore {
    pool: PgPool,
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_secretariat_by_code(&self, code: &str) -> Result<Option<Uuid>> {
        let query = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM secretarias WHERE sigla = $1").bind(code);

        let mut guard = self.tx.lock().await;
        let row = match guard.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(&self.pool).await?,
        };
        Ok(row.map(|(id,)| id))
    }

    async fn find_import(&self, secretariat_id: Uuid, period: ReferencePeriod) -> Result<Option<Uuid>> {
        let query = sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM importacoes WHERE secretaria_id = $1 AND mes = $2 AND ano = $3",
        )
        .bind(secretariat_id)
        .bind(period.month as i32)
        .bind(period.year);

        let mut guard = self.tx.lock().await;
        let row = match guard.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(&self.pool).await?,
        };
        Ok(row.map(|(id,)| id))
    }

    async fn insert_import(&self, record: &ImportRecord) -> Result<Uuid> {
        let import_id = Uuid::new_v4();
        let query = sqlx::query(
            r#"
            INSERT INTO importacoes (id, secretaria_id, mes, ano, arquivo_nome, total_entregas, importado_por)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(import_id)
        .bind(record.secretariat_id)
        .bind(record.period.month as i32)
        .bind(record.period.year)
        .bind(&record.source_file_name)
        .bind(record.total_delivery_count as i32)
        .bind(&record.imported_by);

        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(import_id)
    }

    async fn update_import(&self, import_id: Uuid, record: &ImportRecord) -> Result<()> {
        let query = sqlx::query(
            r#"
            UPDATE importacoes
            SET secretaria_id = $2, mes = $3, ano = $4, arquivo_nome = $5,
                total_entregas = $6, importado_por = $7, importado_em = now()
            WHERE id = $1
            "#,
        )
        .bind(import_id)
        .bind(record.secretariat_id)
        .bind(record.period.month as i32)
        .bind(record.period.year)
        .bind(&record.source_file_name)
        .bind(record.total_delivery_count as i32)
        .bind(&record.imported_by);

        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn delete_deliveries_by_import(&self, import_id: Uuid) -> Result<()> {
        let query = sqlx::query("DELETE FROM entregas WHERE importacao_id = $1").bind(import_id);

        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn insert_delivery(&self, keys: &DeliveryKeys, delivery: &CanonicalDelivery) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO entregas
            (id, importacao_id, secretaria_id, mes_referencia, ano_referencia,
             codigo_meta, codigo_entrega, descricao_entrega, indicador, data_inicio, data_termino,
             status, superintendencia, setor, interlocutor, responsavel_atualizacao, percentual_execucao)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(keys.import_id)
        .bind(keys.secretariat_id)
        .bind(keys.period.month as i32)
        .bind(keys.period.year)
        .bind(delivery.meta_code.as_deref())
        .bind(&delivery.delivery_code)
        .bind(delivery.description.as_deref())
        .bind(delivery.indicator.as_deref())
        .bind(delivery.start_date)
        .bind(delivery.end_date)
        .bind(delivery.status.as_ref().map(|s| s.label()))
        .bind(delivery.superintendency.as_deref())
        .bind(delivery.sector.as_deref())
        .bind(delivery.contact.as_deref())
        .bind(delivery.updated_by.as_deref())
        .bind(delivery.execution_percent);

        let mut guard = self.tx.lock().await;
        let Some(tx) = guard.as_mut() else {
            query.execute(&self.pool).await?;
            return Ok(());
        };

        // A failed row must not abort the surrounding transaction
        sqlx::query("SAVEPOINT delivery_row").execute(&mut **tx).await?;
        match query.execute(&mut **tx).await {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT delivery_row")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            }
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT delivery_row")
                    .execute(&mut **tx)
                    .await?;
                Err(e).with_context(|| format!("Failed to insert delivery {}", delivery.delivery_code))
            }
        }
    }

    async fn begin(&self) -> Result<()> {
        let mut guard = self.tx.lock().await;
        if guard.is_some() {
            bail!("transaction already open");
        }
        *guard = Some(self.pool.begin().await.context("Failed to open transaction")?);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let tx = self.tx.lock().await.take();
        if let Some(tx) = tx {
            tx.commit().await.context("Failed to commit import")?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let tx = self.tx.lock().await.take();
        if let Some(tx) = tx {
            tx.rollback().await.context("Failed to roll back import")?;
        }
        Ok(())
    }
}
