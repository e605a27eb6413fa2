use failure::Fail;

bitflags! {
    /// Permissions allow for a fine-grained control over what actions a given
    /// user can take.
    pub struct PermissionBits: i32 {
        /// All bits allocated for content management permissions.
        const MANAGE_CONTENT_BITS = 0x0000000f;
        /// Permission holder can create and edit drafts.
        const EDIT_CONTENT = 0x00000001;
        /// Permission holder can publish drafts and requested deletions.
        const PUBLISH_CONTENT = 0x00000002;
        /// Permission holder can request deletion of published content.
        const REQUEST_DELETION = 0x00000004;
    }
}

impl PermissionBits {
    /// Get set of all elevated permissions.
    #[inline]
    pub fn elevated() -> PermissionBits {
        PermissionBits::all()
    }

    /// Get set of all (non-elevated) permissions.
    #[inline]
    pub fn normal() -> PermissionBits {
        PermissionBits::EDIT_CONTENT
    }

    /// Verify that all required permissions are present.
    ///
    /// This is the same check as `self.contains(permissions)`, but returns
    /// a typed error listing the missing bits.
    pub fn require(&self, permissions: PermissionBits)
    -> Result<(), RequirePermissionsError> {
        if self.contains(permissions) {
            Ok(())
        } else {
            Err(RequirePermissionsError(permissions - *self))
        }
    }
}

#[derive(Debug, Fail)]
#[fail(display = "Missing required permissions: {:?}", _0)]
pub struct RequirePermissionsError(PermissionBits);
