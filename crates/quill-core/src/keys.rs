use quill_api::{ContactBioInfo, ContactId, KeySyncRecord, MemberRecord};

pub(crate) struct MemberKeys {
    pub capable: Vec<(ContactId, String)>,
    pub unencrypted: Vec<ContactId>,
}

pub(crate) fn partition_members(members: &[MemberRecord]) -> MemberKeys {
    let mut capable = Vec::new();
    let mut unencrypted = Vec::new();
    for member in members {
        if !member.is_present() {
            continue;
        }
        let bio = ContactBioInfo::from_alias(member.alias.as_deref());
        if bio.keychain_id.is_empty() {
            unencrypted.push(member.contact.clone());
        } else {
            capable.push((member.contact.clone(), bio.keychain_id));
        }
    }
    MemberKeys {
        capable,
        unencrypted,
    }
}

pub(crate) fn pending_import(contact: &ContactId, alias: Option<&str>) -> Option<KeySyncRecord> {
    let bio = ContactBioInfo::from_alias(alias);
    if !bio.public_key.is_empty() && bio.keychain_id.is_empty() {
        Some(KeySyncRecord {
            contact_id: contact.value.clone(),
            public_key: bio.public_key,
            keychain_id: String::new(),
        })
    } else {
        None
    }
}

pub(crate) fn merge_import(alias: Option<&str>, record: &KeySyncRecord) -> String {
    let mut bio = ContactBioInfo::from_alias(alias);
    bio.public_key = record.public_key.clone();
    bio.keychain_id = record.keychain_id.clone();
    bio.to_alias()
}
