use crate::application::session::SessionManager;
use crate::domain::boards::{
    Board, BoardDraft, BoardInvite, BoardMember, BoardMembers, BoardTask, BoardTaskDraft,
    BoardTaskStatus,
};
use crate::infrastructure::api_client::SwampApi;
use crate::infrastructure::error::InfraError;
use std::sync::Arc;

/// Shared boards: membership, invites and the three-column task board.
/// Role checks run locally first so a plain member gets a clear message
/// instead of a server 403; the server still has the final word.
pub struct BoardService {
    api: Arc<dyn SwampApi>,
    session: Arc<SessionManager>,
}

impl BoardService {
    pub fn new(api: Arc<dyn SwampApi>, session: Arc<SessionManager>) -> Self {
        Self { api, session }
    }

    pub async fn list(&self) -> Result<Vec<Board>, InfraError> {
        let access_token = self.session.access_token()?;
        self.api
            .list_boards(&access_token)
            .await
            .inspect_err(|error| self.session.note_failure(error))
    }

    pub async fn create(&self, draft: &BoardDraft) -> Result<Board, InfraError> {
        let draft = draft.normalized();
        draft.validate().map_err(InfraError::Validation)?;
        let access_token = self.session.access_token()?;
        let board = self
            .api
            .create_board(&access_token, &draft)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(board_id = %board.id, name = %board.name, "board created");
        Ok(board)
    }

    pub async fn delete(&self, board_id: &str) -> Result<Board, InfraError> {
        let board = self.managed_board(board_id, "delete it").await?;
        let access_token = self.session.access_token()?;
        self.api
            .delete_board(&access_token, &board.id)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(board_id = %board.id, "board deleted");
        Ok(board)
    }

    pub async fn tasks(&self, board_id: &str) -> Result<Vec<BoardTask>, InfraError> {
        let board_id = required(board_id, "board id")?;
        let access_token = self.session.access_token()?;
        self.api
            .list_board_tasks(&access_token, board_id)
            .await
            .inspect_err(|error| self.session.note_failure(error))
    }

    pub async fn add_task(
        &self,
        board_id: &str,
        draft: &BoardTaskDraft,
    ) -> Result<BoardTask, InfraError> {
        let board_id = required(board_id, "board id")?;
        let draft = draft.normalized();
        draft.validate().map_err(InfraError::Validation)?;
        let access_token = self.session.access_token()?;
        let task = self
            .api
            .create_board_task(&access_token, board_id, &draft)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(board_id, task_id = %task.id, "board task created");
        Ok(task)
    }

    pub async fn move_task(
        &self,
        board_id: &str,
        task_id: &str,
        status: BoardTaskStatus,
    ) -> Result<(), InfraError> {
        let board_id = required(board_id, "board id")?;
        let task_id = required(task_id, "task id")?;
        let access_token = self.session.access_token()?;
        self.api
            .update_board_task_status(&access_token, board_id, task_id, status)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(board_id, task_id, status = status.as_str(), "board task moved");
        Ok(())
    }

    /// Only owners and admins may invite.
    pub async fn invite(&self, board_id: &str, username: &str) -> Result<String, InfraError> {
        let username = required(username, "username")?;
        let board = self.managed_board(board_id, "invite members").await?;
        let access_token = self.session.access_token()?;
        let message = self
            .api
            .invite_to_board(&access_token, &board.id, username)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(board_id = %board.id, username, "board invite sent");
        Ok(message)
    }

    pub async fn members(&self, board_id: &str) -> Result<BoardMembers, InfraError> {
        let board_id = required(board_id, "board id")?;
        let access_token = self.session.access_token()?;
        self.api
            .list_board_members(&access_token, board_id)
            .await
            .inspect_err(|error| self.session.note_failure(error))
    }

    /// `member` is a member id or username. The owner cannot be removed and
    /// only the owner removes anyone.
    pub async fn remove_member(&self, board_id: &str, member: &str) -> Result<BoardMember, InfraError> {
        let member = required(member, "member")?;
        let members = self.members(board_id).await?;
        if !members.is_owner {
            return Err(InfraError::Validation(
                "only the board owner can remove members".to_string(),
            ));
        }
        let target = members
            .find(member)
            .cloned()
            .ok_or_else(|| InfraError::Validation(format!("'{member}' is not a member of this board")))?;
        if target.is_owner() {
            return Err(InfraError::Validation(
                "the board owner cannot be removed".to_string(),
            ));
        }

        let access_token = self.session.access_token()?;
        self.api
            .remove_board_member(&access_token, board_id.trim(), &target.id)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(board_id = board_id.trim(), member_id = %target.id, "board member removed");
        Ok(target)
    }

    pub async fn invites(&self) -> Result<Vec<BoardInvite>, InfraError> {
        let access_token = self.session.access_token()?;
        self.api
            .list_invites(&access_token)
            .await
            .inspect_err(|error| self.session.note_failure(error))
    }

    pub async fn answer_invite(&self, invite_id: &str, accept: bool) -> Result<(), InfraError> {
        let invite_id = required(invite_id, "invite id")?;
        let access_token = self.session.access_token()?;
        self.api
            .respond_to_invite(&access_token, invite_id, accept)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::info!(invite_id, accept, "board invite answered");
        Ok(())
    }

    async fn managed_board(&self, board_id: &str, action: &str) -> Result<Board, InfraError> {
        let board_id = required(board_id, "board id")?;
        let board = self
            .list()
            .await?
            .into_iter()
            .find(|board| board.id == board_id)
            .ok_or_else(|| InfraError::Validation(format!("no board with id {board_id}")))?;
        if !board.role.can_manage() {
            return Err(InfraError::Validation(format!(
                "only the board owner or an admin can {action}"
            )));
        }
        Ok(board)
    }
}

/// Tasks grouped into the board's columns, in column order.
pub fn columns(tasks: &[BoardTask]) -> Vec<(BoardTaskStatus, Vec<&BoardTask>)> {
    BoardTaskStatus::ALL
        .into_iter()
        .map(|status| {
            let column = tasks.iter().filter(|task| task.status == status).collect();
            (status, column)
        })
        .collect()
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::store::AppStore;
    use crate::application::testing::FakeSwampApi;
    use crate::domain::boards::BoardRole;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::error::ErrorKind;

    fn service(api: &Arc<FakeSwampApi>) -> BoardService {
        let credentials = Arc::new(InMemoryCredentialStore::with_token(FakeSwampApi::token()));
        let session = Arc::new(SessionManager::new(
            Arc::clone(api) as Arc<dyn SwampApi>,
            credentials,
            Arc::new(AppStore::default()),
        ));
        BoardService::new(Arc::clone(api) as Arc<dyn SwampApi>, session)
    }

    fn members(is_owner: bool) -> BoardMembers {
        BoardMembers {
            members: vec![
                FakeSwampApi::member("1", "albert", BoardRole::Owner),
                FakeSwampApi::member("2", "alberta", BoardRole::Member),
            ],
            is_owner,
        }
    }

    #[tokio::test]
    async fn create_trims_and_rejects_blank_names() {
        let api = Arc::new(FakeSwampApi::default());
        let boards = service(&api);

        let error = boards.create(&BoardDraft::new("  ")).await.expect_err("blank");
        assert_eq!(error.kind(), ErrorKind::ValidationFailure);
        assert!(api.board_log().is_empty());

        let board = boards.create(&BoardDraft::new(" Study group ")).await.expect("create");
        assert_eq!(board.name, "Study group");
        assert_eq!(api.board_log(), vec!["create_board Study group".to_string()]);
    }

    #[tokio::test]
    async fn members_cannot_invite_or_delete() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_boards(Ok(vec![FakeSwampApi::board("3", BoardRole::Member)]));
        let boards = service(&api);

        let error = boards.invite("3", "carl").await.expect_err("member invite");
        assert_eq!(error.kind(), ErrorKind::ValidationFailure);
        let error = boards.delete("3").await.expect_err("member delete");
        assert_eq!(error.kind(), ErrorKind::ValidationFailure);
        assert!(api.board_log().is_empty());
    }

    #[tokio::test]
    async fn admin_invites_by_trimmed_username() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_boards(Ok(vec![FakeSwampApi::board("3", BoardRole::Admin)]));
        let boards = service(&api);

        let message = boards.invite(" 3 ", "  carl ").await.expect("invite");
        assert_eq!(message, "Invited carl");
        assert_eq!(api.board_log(), vec!["invite 3 carl".to_string()]);

        let error = boards.invite("3", " ").await.expect_err("blank username");
        assert_eq!(error.kind(), ErrorKind::ValidationFailure);
    }

    #[tokio::test]
    async fn unknown_board_is_reported_before_any_mutation() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_boards(Ok(vec![FakeSwampApi::board("3", BoardRole::Owner)]));
        let boards = service(&api);

        let error = boards.delete("9").await.expect_err("unknown");
        assert!(error.to_string().contains("no board with id 9"));
        let deleted = boards.delete("3").await.expect("delete");
        assert_eq!(deleted.id, "3");
        assert_eq!(api.board_log(), vec!["delete_board 3".to_string()]);
    }

    #[tokio::test]
    async fn owner_removes_member_by_username() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_members(Ok(members(true)));
        let boards = service(&api);

        let removed = boards.remove_member("3", "alberta").await.expect("remove");
        assert_eq!(removed.id, "2");
        assert_eq!(api.board_log(), vec!["remove_member 3 2".to_string()]);
    }

    #[tokio::test]
    async fn owner_cannot_be_removed_and_non_owner_cannot_remove() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_members(Ok(members(true)));
        let boards = service(&api);
        let error = boards.remove_member("3", "1").await.expect_err("owner");
        assert!(error.to_string().contains("owner cannot be removed"));

        api.set_members(Ok(members(false)));
        let error = boards.remove_member("3", "2").await.expect_err("not owner");
        assert_eq!(error.kind(), ErrorKind::ValidationFailure);

        api.set_members(Ok(members(true)));
        let error = boards.remove_member("3", "zed").await.expect_err("stranger");
        assert!(error.to_string().contains("not a member"));
        assert!(api.board_log().is_empty());
    }

    #[tokio::test]
    async fn tasks_group_into_columns_in_order() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_board_tasks(Ok(vec![
            FakeSwampApi::board_task("1", BoardTaskStatus::Done),
            FakeSwampApi::board_task("2", BoardTaskStatus::Todo),
            FakeSwampApi::board_task("3", BoardTaskStatus::Done),
        ]));
        let boards = service(&api);

        let tasks = boards.tasks("3").await.expect("tasks");
        let grouped = columns(&tasks)
            .into_iter()
            .map(|(status, tasks)| {
                let ids = tasks.iter().map(|task| task.id.as_str()).collect::<Vec<_>>();
                (status, ids)
            })
            .collect::<Vec<_>>();
        assert_eq!(
            grouped,
            vec![
                (BoardTaskStatus::Todo, vec!["2"]),
                (BoardTaskStatus::InProgress, vec![]),
                (BoardTaskStatus::Done, vec!["1", "3"]),
            ]
        );
    }

    #[tokio::test]
    async fn add_and_move_tasks() {
        let api = Arc::new(FakeSwampApi::default());
        let boards = service(&api);

        let mut draft = BoardTaskDraft::new(" Slides ");
        draft.assigned_to = Some(" ".to_string());
        let task = boards.add_task("3", &draft).await.expect("add");
        assert_eq!(task.status, BoardTaskStatus::Todo);
        assert_eq!(task.assigned_to, None);
        boards
            .move_task("3", &task.id, BoardTaskStatus::InProgress)
            .await
            .expect("move");

        assert_eq!(
            api.board_log(),
            vec![
                "add_task 3 Slides".to_string(),
                "move 3 new in_progress".to_string()
            ]
        );
        assert!(boards.add_task("3", &BoardTaskDraft::new(" ")).await.is_err());
    }

    #[tokio::test]
    async fn invites_are_accepted_or_declined_by_id() {
        let api = Arc::new(FakeSwampApi::default());
        let boards = service(&api);
        boards.answer_invite("5", true).await.expect("accept");
        boards.answer_invite(" 6 ", false).await.expect("decline");
        assert_eq!(api.board_log(), vec!["accept 5".to_string(), "decline 6".to_string()]);
    }

    #[tokio::test]
    async fn unauthorized_board_call_signs_out() {
        let api = Arc::new(FakeSwampApi::default());
        api.set_boards(Err(InfraError::Unauthorized("expired".to_string())));
        let boards = service(&api);

        assert!(boards.list().await.is_err());
        let error = boards.invites().await.expect_err("signed out");
        assert_eq!(error.kind(), ErrorKind::AuthFailure);
        assert!(error.to_string().contains("not signed in"));
    }
}
