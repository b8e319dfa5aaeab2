use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::Paper;

pub(crate) async fn find_for_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Paper>, sqlx::Error> {
    let paper: Option<Json<Paper>> = sqlx::query_scalar(
        "SELECT paper FROM exam_papers WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(paper.map(|Json(paper)| paper))
}
